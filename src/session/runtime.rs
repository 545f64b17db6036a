//! Session runtime: owns the engines and executes effects

use super::effect::Effect;
use super::event::Event;
use super::history::{History, HistoryStore};
use super::state::{Session, SessionContext, SessionSnapshot};
use super::transition::{transition, TransitionError};
use crate::gateway::{AiGateway, ChatRequest, ChatTurn, Endpoint, GatewayError};
use crate::voice::{RecognitionEvent, SpeechRecognizer, SpeechSynthesizer};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

const COMMAND_CHANNEL_SIZE: usize = 16;
const EVENT_CHANNEL_SIZE: usize = 64;
const UPDATE_CHANNEL_SIZE: usize = 128;

/// What observers of a session receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    StateChanged(SessionSnapshot),
    /// User-facing failure text; exactly one per failed cycle
    UserMessage { message: String },
    /// A command was refused (busy, nothing to cancel, ...)
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Session {0} is closed")]
    Closed(String),
    #[error("Session {0} already exists")]
    AlreadyOpen(String),
    #[error("Session {0} not found")]
    NotFound(String),
}

struct Command {
    event: Event,
    reply: oneshot::Sender<Result<(), TransitionError>>,
}

/// Caller-side handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    command_tx: mpsc::Sender<Command>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn start_listening(&self) -> Result<(), SessionError> {
        self.send(Event::StartListening).await
    }

    pub async fn submit_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Event::SubmitText { text: text.into() }).await
    }

    /// Stop whatever phase is active. Returns once engines are halted.
    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.send(Event::Cancel).await
    }

    /// Halt everything and stop the runtime
    pub async fn close(&self, clear_history: bool) -> Result<(), SessionError> {
        self.send(Event::Close { clear_history }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates_tx.subscribe()
    }

    /// Last published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn send(&self, event: Event) -> Result<(), SessionError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command { event, reply })
            .await
            .map_err(|_| SessionError::Closed(self.session_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| SessionError::Closed(self.session_id.clone()))?
            .map_err(SessionError::from)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Event loop for one interaction session
pub struct SessionRuntime<G, R, S>
where
    G: AiGateway + 'static,
    R: SpeechRecognizer + 'static,
    S: SpeechSynthesizer + 'static,
{
    context: SessionContext,
    session: Session,
    gateway: Arc<G>,
    recognizer: Arc<R>,
    synthesizer: Arc<S>,
    history_store: Option<Arc<dyn HistoryStore>>,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Stops the transcript pump of the running recognizer
    recognition_token: Option<CancellationToken>,
    /// Abandons the in-flight gateway call
    gateway_token: Option<CancellationToken>,
    /// Drops the completion of the current utterance
    speech_token: Option<CancellationToken>,
}

impl<G, R, S> SessionRuntime<G, R, S>
where
    G: AiGateway + 'static,
    R: SpeechRecognizer + 'static,
    S: SpeechSynthesizer + 'static,
{
    pub fn new(
        context: SessionContext,
        gateway: Arc<G>,
        recognizer: R,
        synthesizer: S,
    ) -> (Self, SessionHandle) {
        let session = Session::new(context.voice.history_capacity);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(SessionSnapshot::capture(&context, &session));

        let handle = SessionHandle {
            session_id: context.session_id.clone(),
            command_tx,
            updates_tx: updates_tx.clone(),
            snapshot_rx,
        };

        let runtime = Self {
            context,
            session,
            gateway,
            recognizer: Arc::new(recognizer),
            synthesizer: Arc::new(synthesizer),
            history_store: None,
            command_rx,
            event_rx,
            event_tx,
            updates_tx,
            snapshot_tx,
            recognition_token: None,
            gateway_token: None,
            speech_token: None,
        };
        (runtime, handle)
    }

    /// Persist completed exchanges to `store`
    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    /// Start from previously recorded history
    pub fn with_history(mut self, history: History) -> Self {
        self.session.history = history;
        self.snapshot_tx
            .send_replace(SessionSnapshot::capture(&self.context, &self.session));
        self
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => {
                    let Some(Command { event, reply }) = command else {
                        // Every handle is gone
                        let _ = self.process_event(Event::Close { clear_history: false }).await;
                        break;
                    };
                    let closing = matches!(event, Event::Close { .. });
                    let result = self.process_event(event).await;
                    if let Err(e) = &result {
                        tracing::debug!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Command rejected"
                        );
                        if e.is_rejection() {
                            let _ = self.updates_tx.send(SessionUpdate::Rejected {
                                reason: e.to_string(),
                            });
                        }
                    }
                    if closing {
                        // Handles report closed before the caller sees the reply
                        self.command_rx.close();
                    }
                    let _ = reply.send(result);
                    if closing {
                        break;
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event).await {
                        tracing::debug!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Dropped event"
                        );
                    }
                }
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        let mut pending = VecDeque::from([event]);

        while let Some(current) = pending.pop_front() {
            let result = transition(&self.session, &self.context, current)?;

            // Engines are halted before the new state becomes visible
            let (halting, rest): (Vec<_>, Vec<_>) =
                result.effects.into_iter().partition(Effect::is_halting);
            for effect in halting {
                self.execute_effect(effect).await;
            }

            let old = std::mem::replace(&mut self.session, result.new_session);
            tracing::debug!(
                session_id = %self.context.session_id,
                turn = self.session.turn,
                from = old.state.name(),
                to = self.session.state.name(),
                "Session transition"
            );

            for effect in rest {
                if let Some(generated) = self.execute_effect(effect).await {
                    pending.push_back(generated);
                }
            }
        }

        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        let turn = self.session.turn;

        match effect {
            Effect::StartRecognition { locale } => self.start_recognition(&locale, turn).await,

            Effect::StopRecognition => {
                if let Some(token) = self.recognition_token.take() {
                    token.cancel();
                    self.recognizer.stop();
                }
                None
            }

            Effect::CancelSynthesis => {
                if let Some(token) = self.speech_token.take() {
                    token.cancel();
                }
                self.synthesizer.cancel_all();
                None
            }

            Effect::AbortGateway => {
                if let Some(token) = self.gateway_token.take() {
                    tracing::info!(
                        session_id = %self.context.session_id,
                        turn,
                        "Abandoning gateway call"
                    );
                    token.cancel();
                }
                None
            }

            Effect::CallGateway { command, context } => {
                self.call_gateway(&command, context, turn);
                None
            }

            Effect::Speak { text } => {
                self.speak(text, turn);
                None
            }

            Effect::PersistHistory { entry } => {
                if let Some(store) = &self.history_store {
                    let capacity = self.session.history.capacity();
                    if let Err(e) = store.append(&self.context.session_id, &entry, capacity).await {
                        tracing::warn!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Failed to persist history"
                        );
                    }
                }
                None
            }

            Effect::ClearHistory => {
                if let Some(store) = &self.history_store {
                    if let Err(e) = store.clear(&self.context.session_id).await {
                        tracing::warn!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Failed to clear history"
                        );
                    }
                }
                None
            }

            Effect::SurfaceError { message } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    turn,
                    message = %message,
                    "Surfacing error"
                );
                let _ = self.updates_tx.send(SessionUpdate::UserMessage { message });
                Some(Event::ErrorSurfaced { turn })
            }

            Effect::PublishState => {
                let snapshot = SessionSnapshot::capture(&self.context, &self.session);
                self.snapshot_tx.send_replace(snapshot.clone());
                let _ = self.updates_tx.send(SessionUpdate::StateChanged(snapshot));
                None
            }
        }
    }

    async fn start_recognition(&mut self, locale: &str, turn: u64) -> Option<Event> {
        if let Some(previous) = self.recognition_token.take() {
            previous.cancel();
        }

        let mut events = match self.recognizer.start(locale).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    error = %e,
                    "Recognizer failed to start"
                );
                return Some(Event::RecognitionError {
                    turn,
                    message: e.to_string(),
                });
            }
        };

        let token = CancellationToken::new();
        self.recognition_token = Some(token.clone());
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    next = events.recv() => next,
                };
                let (event, done) = match next {
                    Some(RecognitionEvent::Interim(text)) => {
                        (Event::TranscriptInterim { turn, text }, false)
                    }
                    Some(RecognitionEvent::Final(text)) => {
                        (Event::TranscriptFinalized { turn, text }, false)
                    }
                    Some(RecognitionEvent::Error(message)) => {
                        (Event::RecognitionError { turn, message }, true)
                    }
                    Some(RecognitionEvent::Ended) | None => {
                        (Event::RecognitionEnded { turn }, true)
                    }
                };
                if event_tx.send(event).await.is_err() || done {
                    break;
                }
            }
        });

        None
    }

    fn call_gateway(&mut self, command: &str, context: Vec<ChatTurn>, turn: u64) {
        let voice = &self.context.voice;
        let request = ChatRequest {
            message: voice.prompt_for(command),
            context,
            language: voice.locale.clone(),
            max_tokens: Some(voice.max_tokens),
            is_voice_command: true,
        };

        let token = CancellationToken::new();
        if let Some(previous) = self.gateway_token.replace(token.clone()) {
            previous.cancel();
        }

        let gateway = Arc::clone(&self.gateway);
        let event_tx = self.event_tx.clone();
        let session_id = self.context.session_id.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let payload = match serde_json::to_value(&request) {
                Ok(payload) => payload,
                Err(e) => {
                    let error = GatewayError::InvalidRequest(e.to_string());
                    let _ = event_tx.send(Event::GatewayFailed { turn, error }).await;
                    return;
                }
            };

            tokio::select! {
                biased;

                () = token.cancelled() => {
                    tracing::debug!(session_id = %session_id, turn, "Gateway call abandoned");
                }

                result = gateway.invoke(Endpoint::Chat.operation(), &payload) => {
                    let event = match result.and_then(|response| response.reply()) {
                        Ok(text) => Event::ResponseReceived {
                            turn,
                            text,
                            received_at: Utc::now(),
                            duration_ms: u64::try_from(started.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                        },
                        Err(error) => {
                            tracing::warn!(
                                session_id = %session_id,
                                turn,
                                error = %error,
                                "Gateway call failed"
                            );
                            Event::GatewayFailed { turn, error }
                        }
                    };
                    let _ = event_tx.send(event).await;
                }
            }
        });
    }

    fn speak(&mut self, text: String, turn: u64) {
        let token = CancellationToken::new();
        if let Some(previous) = self.speech_token.replace(token.clone()) {
            previous.cancel();
        }

        let synthesizer = Arc::clone(&self.synthesizer);
        let options = self.context.voice.speech_options();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = token.cancelled() => {}

                result = synthesizer.speak(&text, &options) => {
                    let event = match result {
                        Ok(()) => Event::SynthesisComplete { turn },
                        Err(e) => Event::SynthesisFailed { turn, message: e.to_string() },
                    };
                    let _ = event_tx.send(event).await;
                }
            }
        });
    }
}
