//! Registry of open sessions sharing one gateway

use super::history::{History, HistoryStore};
use super::runtime::{SessionError, SessionHandle, SessionRuntime};
use super::state::SessionContext;
use crate::config::VoiceConfig;
use crate::gateway::AiGateway;
use crate::voice::{SpeechRecognizer, SpeechSynthesizer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Opens and closes per-user sessions.
///
/// Every session talks to the AI service through the same gateway, so they
/// share its breaker and concurrency cap while keeping independent state.
pub struct SessionManager<G: AiGateway + 'static> {
    gateway: Arc<G>,
    voice: VoiceConfig,
    history_store: Option<Arc<dyn HistoryStore>>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl<G: AiGateway + 'static> SessionManager<G> {
    pub fn new(gateway: Arc<G>, voice: VoiceConfig) -> Self {
        Self {
            gateway,
            voice,
            history_store: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    /// Open a session under a fresh id
    pub async fn open<R, S>(
        &self,
        recognizer: R,
        synthesizer: S,
    ) -> Result<SessionHandle, SessionError>
    where
        R: SpeechRecognizer + 'static,
        S: SpeechSynthesizer + 'static,
    {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.open_with_id(session_id, recognizer, synthesizer).await
    }

    /// Open a session under `session_id`, restoring persisted history
    pub async fn open_with_id<R, S>(
        &self,
        session_id: impl Into<String>,
        recognizer: R,
        synthesizer: S,
    ) -> Result<SessionHandle, SessionError>
    where
        R: SpeechRecognizer + 'static,
        S: SpeechSynthesizer + 'static,
    {
        let session_id = session_id.into();
        if self.get(&session_id).is_some() {
            return Err(SessionError::AlreadyOpen(session_id));
        }

        let context = SessionContext::new(session_id.clone(), self.voice.clone());
        let (mut runtime, handle) =
            SessionRuntime::new(context, Arc::clone(&self.gateway), recognizer, synthesizer);

        if let Some(store) = &self.history_store {
            match store.load(&session_id).await {
                Ok(entries) if !entries.is_empty() => {
                    tracing::debug!(
                        session_id = %session_id,
                        count = entries.len(),
                        "Restored history"
                    );
                    let history = History::from_entries(self.voice.history_capacity, entries);
                    runtime = runtime.with_history(history);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to load history");
                }
            }
            runtime = runtime.with_history_store(Arc::clone(store));
        }

        {
            let mut sessions = self.sessions();
            if sessions.get(&session_id).is_some_and(|h| !h.is_closed()) {
                return Err(SessionError::AlreadyOpen(session_id));
            }
            // Replaces a handle whose session was closed through the handle
            sessions.insert(session_id.clone(), handle.clone());
        }

        tokio::spawn(runtime.run());
        tracing::info!(session_id = %session_id, "Opened session");
        Ok(handle)
    }

    /// Handle of a running session; closed sessions are pruned
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions();
        let closed = sessions.get(session_id).map(SessionHandle::is_closed)?;
        if closed {
            sessions.remove(session_id);
            return None;
        }
        sessions.get(session_id).cloned()
    }

    /// Ids of running sessions, sorted
    pub fn session_ids(&self) -> Vec<String> {
        let mut sessions = self.sessions();
        sessions.retain(|_, handle| !handle.is_closed());
        let mut ids: Vec<_> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Halt the session's engines and stop its runtime
    pub async fn close(&self, session_id: &str, clear_history: bool) -> Result<(), SessionError> {
        let handle = self
            .sessions()
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        handle.close(clear_history).await
    }

    /// Close every open session, keeping history
    pub async fn close_all(&self) {
        let handles: Vec<_> = self.sessions().drain().map(|(_, h)| h).collect();
        let results = futures::future::join_all(handles.iter().map(|h| h.close(false))).await;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(
                    session_id = %handle.session_id(),
                    error = %e,
                    "Failed to close session"
                );
            }
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
