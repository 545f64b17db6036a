//! Interaction session state types

use super::history::{History, HistoryEntry};
use crate::config::VoiceConfig;
use serde::{Deserialize, Serialize};

/// Phase of the listen / process / respond cycle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,

    /// Speech recognition is running
    Listening,

    /// Waiting on the AI gateway
    Processing { command: String },

    /// Speech synthesis is playing `text`
    Speaking {
        text: String,
        /// True when `text` is the failure message rather than a reply
        fallback: bool,
    },

    /// A failure is being reported to the user.
    ///
    /// `speak` is set when the message is also spoken before returning
    /// to `Idle`.
    Error { message: String, speak: bool },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing { .. } => "processing",
            SessionState::Speaking { .. } => "speaking",
            SessionState::Error { .. } => "error",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// Everything the transition function may change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    /// Bumped whenever a cycle starts or is cancelled; engine events
    /// carrying an older turn are stale
    pub turn: u64,
    pub current_transcript: String,
    pub current_response: String,
    pub history: History,
}

impl Session {
    pub fn new(history_capacity: usize) -> Self {
        Self::with_history(History::new(history_capacity))
    }

    pub fn with_history(history: History) -> Self {
        Self {
            state: SessionState::Idle,
            turn: 0,
            current_transcript: String::new(),
            current_response: String::new(),
            history,
        }
    }
}

/// Immutable inputs to every transition
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub voice: VoiceConfig,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, voice: VoiceConfig) -> Self {
        Self {
            session_id: session_id.into(),
            voice,
        }
    }
}

/// Serializable view published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub turn: u64,
    pub transcript: String,
    pub response: String,
    pub history: Vec<HistoryEntry>,
}

impl SessionSnapshot {
    pub fn capture(context: &SessionContext, session: &Session) -> Self {
        Self {
            session_id: context.session_id.clone(),
            state: session.state.clone(),
            turn: session.turn,
            transcript: session.current_transcript.clone(),
            response: session.current_response.clone(),
            history: session.history.to_vec(),
        }
    }
}
