//! GraphQL transport
//!
//! Posts `{operationName, query, variables}` to the control plane endpoint
//! with Bearer token authentication and unwraps the `{data, errors}`
//! envelope.

use crate::error::{GraphqlError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Control plane GraphQL client
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'a, V> {
    operation_name: &'a str,
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct Response<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseError {
    message: String,
}

impl GraphqlClient {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one operation and decode its `data` object.
    pub async fn request<V, T>(&self, operation: &'static str, query: &str, variables: V) -> Result<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        tracing::debug!(%operation, endpoint = %self.endpoint, "GraphQL request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&Request {
                operation_name: operation,
                query,
                variables,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GraphqlError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Response<T> = serde_json::from_str(&body)?;
        if !envelope.errors.is_empty() {
            return Err(GraphqlError::Graphql {
                operation,
                messages: envelope.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        envelope.data.ok_or(GraphqlError::MissingData(operation))
    }
}
