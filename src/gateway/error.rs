//! Gateway error types

use thiserror::Error;

/// Failure of a call to the AI service.
///
/// Callers always get either a response or one of these; nothing below the
/// gateway panics or throws past it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Circuit is open; no network attempt was made
    #[error("AI service temporarily throttled")]
    Throttled,

    /// Connection, timeout, or transport failure
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Non-2xx status from the service
    #[error("AI service returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },

    /// 2xx whose body is not the JSON envelope
    #[error("invalid response from AI service: {0}")]
    InvalidResponse(String),

    /// The request could not be built (serialization, multipart mime)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 2xx envelope with `success: false`
    #[error("AI service rejected the request: {0}")]
    Rejected(String),

    /// All attempts failed; carries the last attempt's error
    #[error("AI service unavailable after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure(message.into())
    }

    /// Whether a failed attempt with this error may be retried by the client.
    ///
    /// `Throttled` is never retried here: waiting out the cooldown is the
    /// breaker's job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure(_) | Self::ServerError { .. } | Self::InvalidResponse(_)
        )
    }

    /// 429 and 503 mean the service is overloaded and trip the breaker.
    pub fn is_overload(&self) -> bool {
        matches!(self, Self::ServerError { status: 429 | 503, .. })
    }

    /// HTTP status of the underlying failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// The innermost error (unwraps `Exhausted`)
    pub fn root_cause(&self) -> &GatewayError {
        match self {
            Self::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}
