//! Pure session transition function
//!
//! Given the same session, context and event this always yields the same
//! result. All I/O is described by the returned effects.

use super::effect::Effect;
use super::event::Event;
use super::history::HistoryEntry;
use super::state::{Session, SessionContext, SessionState};
use crate::gateway::ChatTurn;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            new_session: session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Already listening")]
    AlreadyListening,
    #[error("Session is busy ({0}), cancel the current cycle first")]
    Busy(&'static str),
    #[error("Nothing to cancel")]
    NothingToCancel,
    #[error("Command text is empty")]
    EmptyCommand,
    #[error("Stale event for turn {got} (current turn {current})")]
    StaleEvent { current: u64, got: u64 },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Errors worth reporting back to whoever issued the command
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            TransitionError::StaleEvent { .. } | TransitionError::InvalidTransition(_)
        )
    }
}

pub fn transition(
    session: &Session,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if let Some(got) = event.turn() {
        if got != session.turn {
            return Err(TransitionError::StaleEvent {
                current: session.turn,
                got,
            });
        }
    }

    let voice = &context.voice;
    let mut next = session.clone();

    let result = match (&session.state, event) {
        // ============================================================
        // Starting a cycle
        // ============================================================
        (SessionState::Idle, Event::StartListening) => {
            begin_cycle(&mut next, SessionState::Listening);
            TransitionResult::new(next).with_effect(Effect::StartRecognition {
                locale: voice.locale.clone(),
            })
        }

        // New input interrupts speech; synthesis is cancelled first
        (SessionState::Speaking { .. }, Event::StartListening) => {
            begin_cycle(&mut next, SessionState::Listening);
            TransitionResult::new(next)
                .with_effect(Effect::CancelSynthesis)
                .with_effect(Effect::StartRecognition {
                    locale: voice.locale.clone(),
                })
        }

        (SessionState::Listening, Event::StartListening) => {
            return Err(TransitionError::AlreadyListening)
        }
        (state, Event::StartListening) => return Err(TransitionError::Busy(state.name())),

        (SessionState::Idle | SessionState::Speaking { .. }, Event::SubmitText { text }) => {
            let command = text.trim().to_string();
            if command.is_empty() {
                return Err(TransitionError::EmptyCommand);
            }
            let was_speaking = !session.state.is_idle();
            begin_cycle(
                &mut next,
                SessionState::Processing {
                    command: command.clone(),
                },
            );
            next.current_transcript.clone_from(&command);
            let context = recent_context(&next);
            TransitionResult::new(next)
                .with_effects(was_speaking.then_some(Effect::CancelSynthesis))
                .with_effect(Effect::CallGateway { command, context })
        }
        (state, Event::SubmitText { .. }) => return Err(TransitionError::Busy(state.name())),

        // ============================================================
        // Listening
        // ============================================================
        (SessionState::Listening, Event::TranscriptInterim { text, .. }) => {
            next.current_transcript = text;
            TransitionResult::new(next)
        }

        (SessionState::Listening, Event::TranscriptFinalized { text, .. }) => {
            let command = text.trim().to_string();
            if command.is_empty() {
                next.state = SessionState::Idle;
                next.current_transcript.clear();
                TransitionResult::new(next).with_effect(Effect::StopRecognition)
            } else {
                next.state = SessionState::Processing {
                    command: command.clone(),
                };
                next.current_transcript.clone_from(&command);
                let context = recent_context(&next);
                TransitionResult::new(next)
                    .with_effect(Effect::StopRecognition)
                    .with_effect(Effect::CallGateway { command, context })
            }
        }

        (SessionState::Listening, Event::Cancel) => {
            next.turn += 1;
            next.state = SessionState::Idle;
            next.current_transcript.clear();
            TransitionResult::new(next).with_effect(Effect::StopRecognition)
        }

        (SessionState::Listening, Event::RecognitionError { .. }) => {
            let message = voice.recognition_failed_message.clone();
            next.state = SessionState::Error {
                message: message.clone(),
                speak: false,
            };
            TransitionResult::new(next)
                .with_effect(Effect::StopRecognition)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::SurfaceError { message })
        }

        (SessionState::Listening, Event::RecognitionEnded { .. }) => {
            next.state = SessionState::Idle;
            TransitionResult::new(next)
        }

        // ============================================================
        // Processing
        // ============================================================
        (
            SessionState::Processing { command },
            Event::ResponseReceived {
                text,
                received_at,
                duration_ms,
                ..
            },
        ) => {
            let response = text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| voice.not_understood_message.clone());
            let entry = HistoryEntry {
                command: command.clone(),
                response: response.clone(),
                timestamp: received_at,
                duration_ms,
            };
            next.history.push(entry.clone());
            next.current_response.clone_from(&response);
            next.state = SessionState::Speaking {
                text: response.clone(),
                fallback: false,
            };
            TransitionResult::new(next)
                .with_effect(Effect::PersistHistory { entry })
                .with_effect(Effect::Speak { text: response })
        }

        (SessionState::Processing { .. }, Event::GatewayFailed { .. }) => {
            let message = voice.fallback_message.clone();
            next.current_response.clone_from(&message);
            next.state = SessionState::Error {
                message: message.clone(),
                speak: true,
            };
            TransitionResult::new(next)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::SurfaceError { message })
        }

        (SessionState::Processing { .. }, Event::Cancel) => {
            next.turn += 1;
            next.state = SessionState::Idle;
            TransitionResult::new(next).with_effect(Effect::AbortGateway)
        }

        // ============================================================
        // Speaking
        // ============================================================
        (SessionState::Speaking { .. }, Event::SynthesisComplete { .. }) => {
            next.state = SessionState::Idle;
            TransitionResult::new(next)
        }

        (SessionState::Speaking { .. }, Event::Cancel) => {
            next.turn += 1;
            next.state = SessionState::Idle;
            TransitionResult::new(next).with_effect(Effect::CancelSynthesis)
        }

        // The failure message already reached the user as text
        (SessionState::Speaking { fallback: true, .. }, Event::SynthesisFailed { .. }) => {
            next.state = SessionState::Idle;
            TransitionResult::new(next)
        }

        (SessionState::Speaking { .. }, Event::SynthesisFailed { .. }) => {
            let message = voice.synthesis_failed_message.clone();
            next.state = SessionState::Error {
                message: message.clone(),
                speak: false,
            };
            TransitionResult::new(next)
                .with_effect(Effect::CancelSynthesis)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::SurfaceError { message })
        }

        // ============================================================
        // Error
        // ============================================================
        (SessionState::Error { message, speak: true }, Event::ErrorSurfaced { .. }) => {
            next.state = SessionState::Speaking {
                text: message.clone(),
                fallback: true,
            };
            TransitionResult::new(next).with_effect(Effect::Speak {
                text: message.clone(),
            })
        }

        (SessionState::Error { speak: false, .. }, Event::ErrorSurfaced { .. }) => {
            next.state = SessionState::Idle;
            TransitionResult::new(next)
        }

        // ============================================================
        // Close and stray commands
        // ============================================================
        (state, Event::Close { clear_history }) => {
            let halt = match state {
                SessionState::Listening => Some(Effect::StopRecognition),
                SessionState::Processing { .. } => Some(Effect::AbortGateway),
                SessionState::Speaking { .. } => Some(Effect::CancelSynthesis),
                SessionState::Idle | SessionState::Error { .. } => None,
            };
            next.turn += 1;
            next.state = SessionState::Idle;
            next.current_transcript.clear();
            next.current_response.clear();
            if clear_history {
                next.history.clear();
            }
            TransitionResult::new(next)
                .with_effects(halt)
                .with_effects(clear_history.then_some(Effect::ClearHistory))
        }

        (_, Event::Cancel) => return Err(TransitionError::NothingToCancel),

        (state, event) => {
            return Err(TransitionError::InvalidTransition(format!(
                "{event:?} in state {}",
                state.name()
            )))
        }
    };

    // Error paths publish before surfacing the message; everything else
    // publishes once the other effects are queued
    if result.effects.contains(&Effect::PublishState) {
        Ok(result)
    } else {
        Ok(result.with_effect(Effect::PublishState))
    }
}

/// Start a fresh cycle in `state`
fn begin_cycle(session: &mut Session, state: SessionState) {
    session.turn += 1;
    session.state = state;
    session.current_transcript.clear();
    session.current_response.clear();
}

/// Recent exchanges, oldest first, sent as chat context
fn recent_context(session: &Session) -> Vec<ChatTurn> {
    session
        .history
        .iter()
        .rev()
        .map(|e| ChatTurn {
            command: e.command.clone(),
            response: e.response.clone(),
        })
        .collect()
}
