//! Local streaming speech recognition
//!
//! A recognizer runs alongside the capture session with its own lifecycle.
//! It reports partial and final text, and signals end-of-utterance on its
//! own schedule. The [`RecognitionCoordinator`] reconciles that signal with
//! explicit stop requests so every session finalizes exactly once.

mod coordinator;
mod nats;

pub use coordinator::{
    CoordinatorState, FinalizeTrigger, FinalizedSession, RecognitionConfig, RecognitionCoordinator,
};
pub use nats::{parse_error_kind, NatsRecognizer};

use tokio::sync::{broadcast, mpsc};

use crate::audio::AudioFrame;
use crate::error::{Result, VoiceError};

/// Events emitted by a local recognizer
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Interim hypothesis, may still change
    Partial(String),
    /// Stable segment
    Final { text: String, confidence: f32 },
    /// End of utterance (silence detected or stream closed)
    Ended,
    Error(RecognizerErrorKind),
}

/// Failure categories reported by recognizers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerErrorKind {
    Network,
    NotAllowed,
    NoSpeech,
    Aborted,
    Other,
}

impl RecognizerErrorKind {
    /// User-facing category; `None` for aborts, which are not worth a banner
    pub fn to_voice_error(self) -> Option<VoiceError> {
        match self {
            RecognizerErrorKind::Network => Some(VoiceError::NetworkFailure(
                "speech recognition service unreachable".to_string(),
            )),
            RecognizerErrorKind::NotAllowed => Some(VoiceError::PermissionDenied(
                "speech recognition not allowed".to_string(),
            )),
            RecognizerErrorKind::NoSpeech => Some(VoiceError::NoSignalDetected),
            RecognizerErrorKind::Aborted => None,
            RecognizerErrorKind::Other => Some(VoiceError::NetworkFailure(
                "speech recognition failed".to_string(),
            )),
        }
    }
}

/// Streaming speech-to-text running next to the capture session
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin recognizing
    ///
    /// `frames` is the live feed of the capture session; recognizers with
    /// their own input may ignore it.
    async fn start(
        &mut self,
        session_id: &str,
        frames: broadcast::Receiver<AudioFrame>,
        language: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>>;

    /// Stop recognizing; must be safe to call after the recognizer ended on its own
    async fn stop(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}
