//! Tracing subscriber setup for host binaries

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "cooking_voice=info";

/// Install the JSON subscriber. Panics if one is already installed.
pub fn init() {
    try_init().expect("global tracing subscriber already set");
}

/// Like [`init`], but reports an already-installed subscriber as an error
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .try_init()
}
