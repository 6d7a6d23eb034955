//! AWS collaborator error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("{service} {operation} failed: {message}")]
    Sdk {
        service: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl From<AwsError> for polaris_cloud::CloudError {
    fn from(err: AwsError) -> Self {
        polaris_cloud::CloudError::transport(err)
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
