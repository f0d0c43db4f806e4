//! The transport boundary: what the manager requires of a network layer,
//! plus an HTTP implementation of it.

use async_trait::async_trait;

use crate::{
    error::TransportError,
    types::{GraphQLRequest, GraphQLResult},
};

/// A transport able to execute one GraphQL operation. Implementations that
/// can answer several operations in one round trip opt in via
/// `supports_batching`, which enables the manager's batcher by default.
#[async_trait]
pub trait NetworkInterface: Send + Sync {
    async fn query(&self, request: GraphQLRequest) -> Result<GraphQLResult, TransportError>;

    fn supports_batching(&self) -> bool { false }

    /// Execute a group of operations, preserving order. The default falls
    /// back to one round trip per request, failing on the first error.
    async fn batch_query(&self, requests: Vec<GraphQLRequest>) -> Result<Vec<GraphQLResult>, TransportError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.query(request).await?);
        }
        Ok(results)
    }
}

/// POSTs operations to a GraphQL endpoint as `{ query, variables,
/// operationName }` JSON; batches go out as a JSON array of the same shape.
pub struct HttpNetworkInterface {
    client: reqwest::Client,
    uri: String,
}

impl HttpNetworkInterface {
    pub fn new(uri: impl Into<String>) -> Self { Self { client: reqwest::Client::new(), uri: uri.into() } }

    async fn post<B: serde::Serialize, R: serde::de::DeserializeOwned>(&self, body: &B) -> Result<R, TransportError> {
        let response = self
            .client
            .post(&self.uri)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        response.json::<R>().await.map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl NetworkInterface for HttpNetworkInterface {
    async fn query(&self, request: GraphQLRequest) -> Result<GraphQLResult, TransportError> { self.post(&request).await }

    fn supports_batching(&self) -> bool { true }

    async fn batch_query(&self, requests: Vec<GraphQLRequest>) -> Result<Vec<GraphQLResult>, TransportError> {
        self.post(&requests).await
    }
}
