//! Effects produced by session transitions

use super::history::HistoryEntry;
use crate::gateway::ChatTurn;

/// Side effects the runtime performs after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartRecognition { locale: String },
    StopRecognition,

    /// Silence synthesis (`cancel_all`)
    CancelSynthesis,

    /// Abandon the in-flight gateway call for this session
    AbortGateway,

    /// Ask the AI service about `command`
    CallGateway {
        command: String,
        context: Vec<ChatTurn>,
    },

    Speak { text: String },

    PersistHistory { entry: HistoryEntry },
    ClearHistory,

    /// Show `message` to the user; yields `ErrorSurfaced`
    SurfaceError { message: String },

    /// Broadcast the committed state
    PublishState,
}

impl Effect {
    /// Effects that must complete before the new state is committed, so no
    /// engine is still running once the session reports it stopped.
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            Effect::StopRecognition | Effect::CancelSynthesis | Effect::AbortGateway
        )
    }
}
