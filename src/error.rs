//! Error types for the voice pipeline

use thiserror::Error;

/// Result type alias for voice pipeline operations
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors that can occur while capturing, transcribing or speaking
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VoiceError {
    /// No usable input device (missing, busy or unplugged)
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user or OS refused access to the microphone
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Local speech recognition is not offered on this host
    #[error("speech recognition unavailable")]
    RecognitionUnavailable,

    /// The recognizer heard nothing it could transcribe
    #[error("no speech detected")]
    NoSignalDetected,

    /// Network call failed
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The audio encoder failed mid-session
    #[error("encoder failure: {0}")]
    EncoderFailure(String),

    /// Remote transcription failed; local transcript is used instead
    #[error("remote transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    /// Speech synthesis or playback failed; reply stays text-only
    #[error("speech playback failed: {0}")]
    SynthesisOrPlaybackFailure(String),

    /// Neither the remote service nor the local recognizer produced text
    #[error("no usable transcript")]
    NoUsableTranscript,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio decoding error
    #[error("decode error: {0}")]
    Decode(String),
}

impl VoiceError {
    /// Errors that prevent a session from ever reaching `Active`
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            VoiceError::DeviceUnavailable(_) | VoiceError::PermissionDenied(_)
        )
    }

    /// Human-readable banner text for this error
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::DeviceUnavailable(_) => {
                "No microphone is available. Check that one is connected and try again.".to_string()
            }
            VoiceError::PermissionDenied(_) => {
                "Microphone access was denied. Allow microphone access to use voice input."
                    .to_string()
            }
            VoiceError::RecognitionUnavailable => {
                "Speech recognition isn't available here, so voice input is off. You can still type."
                    .to_string()
            }
            VoiceError::NoSignalDetected => {
                "I didn't catch anything. Try speaking a little closer to the microphone."
                    .to_string()
            }
            VoiceError::NetworkFailure(_) => {
                "A network problem interrupted voice input. Please try again.".to_string()
            }
            VoiceError::EncoderFailure(_) => {
                "The recording could not be saved, so your words were taken from live recognition."
                    .to_string()
            }
            VoiceError::TranscriptionUnavailable(_) => {
                "Transcription service unavailable, using on-device transcript.".to_string()
            }
            VoiceError::SynthesisOrPlaybackFailure(_) => {
                "Voice playback is unavailable right now; the reply is shown as text.".to_string()
            }
            VoiceError::NoUsableTranscript => {
                "No usable transcript. Please try speaking again.".to_string()
            }
            VoiceError::Config(msg) => format!("Configuration problem: {}", msg),
            VoiceError::Decode(_) => {
                "The reply audio could not be decoded; the reply is shown as text.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(e: reqwest::Error) -> Self {
        VoiceError::NetworkFailure(e.to_string())
    }
}

impl From<hound::Error> for VoiceError {
    fn from(e: hound::Error) -> Self {
        VoiceError::EncoderFailure(e.to_string())
    }
}

impl From<symphonia::core::errors::Error> for VoiceError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        VoiceError::Decode(e.to_string())
    }
}
