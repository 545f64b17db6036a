//! Speech engine abstractions
//!
//! The session drives recognition and synthesis only through these traits.
//! Platform engines (browser speech APIs, native recognizers, TTS services)
//! live with the host application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output of a running recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Partial transcript, may still change
    Interim(String),
    /// Final transcript for this utterance
    Final(String),
    Error(String),
    /// Capture stopped on its own
    Ended,
}

/// Synthesis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub locale: String,
    pub rate: f32,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("Engine not available: {0}")]
    Unavailable(String),
    #[error("Recognition failed: {0}")]
    Recognition(String),
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin capture. Events arrive on the returned channel until the
    /// recognizer ends or `stop` is called.
    async fn start(&self, locale: &str) -> Result<mpsc::Receiver<RecognitionEvent>, VoiceError>;

    /// Stop capture immediately
    fn stop(&self);
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Resolves when the utterance has finished playing
    async fn speak(&self, text: &str, options: &SpeechOptions) -> Result<(), VoiceError>;

    /// Silence all queued and playing utterances
    fn cancel_all(&self);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SpeechRecognizer + ?Sized> SpeechRecognizer for Arc<T> {
    async fn start(&self, locale: &str) -> Result<mpsc::Receiver<RecognitionEvent>, VoiceError> {
        (**self).start(locale).await
    }

    fn stop(&self) {
        (**self).stop();
    }
}

#[async_trait]
impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    async fn speak(&self, text: &str, options: &SpeechOptions) -> Result<(), VoiceError> {
        (**self).speak(text, options).await
    }

    fn cancel_all(&self) {
        (**self).cancel_all();
    }
}
