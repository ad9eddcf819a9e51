pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod http;
pub mod nats;
pub mod pipeline;
pub mod playback;
pub mod recognition;
pub mod session;
pub mod transcription;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame,
    AudioLevelMonitor, AudioSource, EncodedAudio, LevelCalibration,
};
pub use config::Config;
pub use conversation::{ConversationTurn, ConversationTurnBuilder, TurnHistory};
pub use error::{Result, VoiceError};
pub use http::{create_router, AppState};
pub use nats::{AudioFrameMessage, NatsClient, TranscriptMessage};
pub use pipeline::{Capabilities, PipelineServices, TurnOutcome, VoicePipeline};
pub use playback::{PlaybackManager, PlaybackOutcome};
pub use recognition::{FinalizedSession, RecognitionConfig, RecognitionCoordinator};
pub use session::{CaptureConfig, CaptureSessionManager, FinalizedCapture, SessionState, VoiceSession};
pub use transcription::{TranscriptionHandoff, TranscriptionResult};
