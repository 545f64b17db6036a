//! Cooking Voice - resilient AI client and voice interaction session
//!
//! Client-side plumbing for a voice-driven cooking assistant:
//!
//! - [`gateway`]: calls to the AI service guarded by exponential backoff, a
//!   shared circuit breaker and a bounded, FIFO request dispatcher.
//! - [`session`]: the Idle, Listening, Processing, Speaking loop for one user,
//!   written as a pure transition function plus an effect executor.
//! - [`voice`]: the recognizer and synthesizer traits the session drives.

#![allow(clippy::missing_errors_doc)] // Errors are documented on the error enums
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod gateway;
pub mod session;
pub mod telemetry;
pub mod voice;

pub use config::{ConfigError, GatewayConfig, VoiceConfig};
pub use gateway::{AiGateway, AiGatewayClient, GatewayError};
pub use session::{SessionHandle, SessionManager, SessionState, SessionUpdate};
