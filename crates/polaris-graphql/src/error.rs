//! GraphQL client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphqlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} failed: {}", .messages.join("; "))]
    Graphql {
        operation: &'static str,
        messages: Vec<String>,
    },

    #[error("{0} response has no data")]
    MissingData(&'static str),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GraphqlError> for polaris_cloud::CloudError {
    fn from(err: GraphqlError) -> Self {
        polaris_cloud::CloudError::transport(err)
    }
}

pub type Result<T> = std::result::Result<T, GraphqlError>;
