//! HTTP client for the AI service

use super::{
    AiGateway, AiRequest, AiResponse, BackoffPolicy, ChatRequest, CircuitBreaker, Dispatcher,
    Endpoint, GatewayError, RecipeRequest, RequestBody, Upload,
};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest slice of an error body kept in `ServerError`
const ERROR_BODY_LIMIT: usize = 200;

/// How failed attempts are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// How long the breaker stays open after a 429/503
    pub cooldown: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(5000);

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::default(),
            cooldown: Self::DEFAULT_COOLDOWN,
        }
    }
}

/// Single entry point for calls to the AI service.
///
/// Cheap to clone; clones share the breaker and the dispatcher.
#[derive(Debug, Clone)]
pub struct AiGatewayClient {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
    breaker: Arc<CircuitBreaker>,
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
}

impl AiGatewayClient {
    /// Client with its own breaker and dispatcher
    pub fn new(config: &GatewayConfig) -> Self {
        Self::with_shared(
            config,
            Arc::new(CircuitBreaker::new()),
            Arc::new(Dispatcher::new(config.max_concurrent)),
        )
    }

    /// Client that backs off together with every other holder of
    /// `breaker` and `dispatcher`
    pub fn with_shared(
        config: &GatewayConfig,
        breaker: Arc<CircuitBreaker>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            breaker,
            dispatcher,
            policy: config.retry_policy(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/api/ai/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Run one request through breaker, dispatcher and retry loop.
    pub async fn send(&self, request: AiRequest) -> Result<AiResponse, GatewayError> {
        if self.breaker.is_open() {
            tracing::warn!(
                endpoint = %request.endpoint,
                "AI service throttled, skipping call"
            );
            return Err(GatewayError::Throttled);
        }

        self.dispatcher
            .submit(|| self.attempt_loop(&request))
            .await
    }

    /// Multipart variant of `invoke`
    pub async fn invoke_upload(
        &self,
        endpoint: &str,
        upload: Upload,
    ) -> Result<AiResponse, GatewayError> {
        self.send(AiRequest::upload(endpoint, upload)).await
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<AiResponse, GatewayError> {
        self.invoke_typed(Endpoint::Chat, request).await
    }

    pub async fn generate_recipe(
        &self,
        request: &RecipeRequest,
    ) -> Result<AiResponse, GatewayError> {
        self.invoke_typed(Endpoint::GenerateRecipe, request).await
    }

    pub async fn analyze_image(&self, image: Upload) -> Result<AiResponse, GatewayError> {
        self.invoke_upload(Endpoint::Vision.operation(), image).await
    }

    pub async fn speech_to_text(&self, audio: Upload) -> Result<AiResponse, GatewayError> {
        self.invoke_upload(Endpoint::SpeechToText.operation(), audio)
            .await
    }

    async fn invoke_typed<T: Serialize + Sync>(
        &self,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<AiResponse, GatewayError> {
        let payload = serde_json::to_value(body).map_err(|e| {
            GatewayError::InvalidRequest(format!("Failed to encode {endpoint}: {e}"))
        })?;
        self.send(AiRequest::json(endpoint.operation(), payload))
            .await
    }

    /// Runs with the dispatcher slot held, backoff sleeps included.
    async fn attempt_loop(&self, request: &AiRequest) -> Result<AiResponse, GatewayError> {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            tracing::info!(
                endpoint = %request.endpoint,
                attempt,
                max_attempts,
                "Calling AI service"
            );
            let started = Instant::now();

            let error = match self.attempt_once(request).await {
                Ok(response) => {
                    tracing::info!(
                        endpoint = %request.endpoint,
                        attempt,
                        duration_ms = started.elapsed().as_millis(),
                        queued_ms = request.submitted_at.elapsed().as_millis(),
                        "AI service call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            if error.is_overload() {
                self.breaker.trip(self.policy.cooldown);
            }

            if !error.is_retryable() {
                tracing::error!(endpoint = %request.endpoint, error = %error, "AI request failed");
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    endpoint = %request.endpoint,
                    attempts = attempt,
                    error = %error,
                    "AI service call failed, retries exhausted"
                );
                return Err(GatewayError::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.backoff.delay_for(attempt);
            tracing::warn!(
                endpoint = %request.endpoint,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "AI service call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt_once(&self, request: &AiRequest) -> Result<AiResponse, GatewayError> {
        let mut builder = self.http.post(self.url_for(&request.endpoint));
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Json(payload) => builder.json(payload),
            // Forms are consumed on send, so each attempt builds a fresh one
            RequestBody::Upload(upload) => builder.multipart(upload.to_form()?),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::network(format!("Request timeout: {e}"))
            } else {
                GatewayError::network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::server(status.as_u16(), error_summary(&body)));
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::InvalidResponse(format!("{e} - body: {}", truncate(&body)))
        })
    }
}

#[async_trait]
impl AiGateway for AiGatewayClient {
    async fn invoke(&self, endpoint: &str, payload: &Value) -> Result<AiResponse, GatewayError> {
        self.send(AiRequest::json(endpoint, payload.clone())).await
    }
}

/// Prefer the service's own `error`/`detail` field over the raw body
fn error_summary(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("detail"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate(body))
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}
