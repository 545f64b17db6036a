//! Voice interaction session
//!
//! Pure transitions over `Session` (Elm style) plus a runtime that executes
//! the resulting effects against the gateway and the speech engines.
//! Phases run strictly in order: Idle, Listening, Processing, Speaking,
//! back to Idle, with Error reporting a failure before returning to Idle.

mod effect;
mod event;
mod history;
mod manager;
mod runtime;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use history::{History, HistoryEntry, HistoryStore, InMemoryHistoryStore};
pub use manager::SessionManager;
pub use runtime::{SessionError, SessionHandle, SessionRuntime, SessionUpdate};
pub use state::{Session, SessionContext, SessionSnapshot, SessionState};
pub use transition::{transition, TransitionError, TransitionResult};
