//! Events that drive the session

use crate::gateway::GatewayError;
use chrono::{DateTime, Utc};

/// Inputs to the transition function.
///
/// User commands carry no turn. Engine and gateway completions carry the
/// turn they were started in so late arrivals can be recognised.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User commands
    StartListening,
    /// Typed or quick-command input, bypasses recognition
    SubmitText {
        text: String,
    },
    Cancel,
    Close {
        clear_history: bool,
    },

    // Recognition
    TranscriptInterim {
        turn: u64,
        text: String,
    },
    TranscriptFinalized {
        turn: u64,
        text: String,
    },
    RecognitionError {
        turn: u64,
        message: String,
    },
    RecognitionEnded {
        turn: u64,
    },

    // Gateway
    ResponseReceived {
        turn: u64,
        /// Reply text, `None` when the service had nothing to say
        text: Option<String>,
        received_at: DateTime<Utc>,
        duration_ms: u64,
    },
    GatewayFailed {
        turn: u64,
        error: GatewayError,
    },

    // Synthesis
    SynthesisComplete {
        turn: u64,
    },
    SynthesisFailed {
        turn: u64,
        message: String,
    },

    /// The error message has been shown to the user
    ErrorSurfaced {
        turn: u64,
    },
}

impl Event {
    /// Turn this completion belongs to; `None` for user commands
    pub fn turn(&self) -> Option<u64> {
        match self {
            Event::StartListening
            | Event::SubmitText { .. }
            | Event::Cancel
            | Event::Close { .. } => None,
            Event::TranscriptInterim { turn, .. }
            | Event::TranscriptFinalized { turn, .. }
            | Event::RecognitionError { turn, .. }
            | Event::RecognitionEnded { turn }
            | Event::ResponseReceived { turn, .. }
            | Event::GatewayFailed { turn, .. }
            | Event::SynthesisComplete { turn }
            | Event::SynthesisFailed { turn, .. }
            | Event::ErrorSurfaced { turn } => Some(*turn),
        }
    }

    pub fn is_user_command(&self) -> bool {
        self.turn().is_none()
    }
}
