use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::signal::AbortSignal;

/// Failure reported by an endpoint. Stored on the query, never raised.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("request aborted")]
    Aborted,

    #[error("request failed: {0}")]
    Failed(String),

    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },
}

impl EndpointError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Arguments for one endpoint call.
#[derive(Clone, Debug)]
pub struct EndpointArgs {
    pub request: Value,
    pub pagination: Value,
    pub meta: Value,
    pub signal: AbortSignal,
}

/// Source of raw data for a query or mutation.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, args: EndpointArgs) -> Result<Value, EndpointError>;
}

struct FnEndpoint<F>(F);

#[async_trait]
impl<F, Fut> Endpoint for FnEndpoint<F>
where
    F: Fn(EndpointArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, EndpointError>> + Send,
{
    async fn call(&self, args: EndpointArgs) -> Result<Value, EndpointError> {
        (self.0)(args).await
    }
}

/// Adapt an async closure into an [`Endpoint`].
pub fn endpoint_fn<F, Fut>(f: F) -> Arc<dyn Endpoint>
where
    F: Fn(EndpointArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, EndpointError>> + Send + 'static,
{
    Arc::new(FnEndpoint(f))
}
