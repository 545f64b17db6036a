//! Resilient client for the AI inference service
//!
//! Every call goes through the same pipeline: circuit breaker check,
//! admission control, then a bounded retry loop with exponential backoff.
//! The breaker and dispatcher are shared objects so several clients (and
//! several sessions) back off together.

mod backoff;
mod breaker;
mod client;
mod dispatcher;
mod error;
mod types;

#[cfg(test)]
mod proptests;

pub use backoff::{BackoffPolicy, Jitter};
pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{AiGatewayClient, RetryPolicy};
pub use dispatcher::Dispatcher;
pub use error::GatewayError;
pub use types::{
    AiRequest, AiResponse, ChatRequest, ChatTurn, Endpoint, RecipeRequest, RequestBody, Upload,
};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// The seam the interaction session calls through
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// POST `payload` to `/api/ai/<endpoint>`
    async fn invoke(&self, endpoint: &str, payload: &Value) -> Result<AiResponse, GatewayError>;
}

#[async_trait]
impl<T: AiGateway + ?Sized> AiGateway for Arc<T> {
    async fn invoke(&self, endpoint: &str, payload: &Value) -> Result<AiResponse, GatewayError> {
        (**self).invoke(endpoint, payload).await
    }
}
