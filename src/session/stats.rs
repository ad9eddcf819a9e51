use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audio::EncodedAudio;
use crate::error::VoiceError;

/// Lifecycle of one capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Acquiring,
    Active,
    Finalizing,
    Finalized,
    Errored,
}

impl SessionState {
    /// Whether a device is held (or being acquired) in this state
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Active | SessionState::Finalizing
        )
    }
}

/// One voice capture attempt
///
/// Loudness fields are only meaningful once `state` is `Finalized`.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSession {
    /// Unique session identifier
    pub session_id: String,

    pub state: SessionState,

    /// Monotonic start time
    #[serde(skip)]
    pub started_at: Instant,

    /// Wall-clock start time (for display and logs)
    pub started_at_utc: DateTime<Utc>,

    /// Capture duration in milliseconds
    pub duration_ms: u64,

    /// Mean loudness over all level samples
    pub average_loudness_db: f32,

    /// Loudest level sample
    pub peak_loudness_db: f32,

    /// Number of level samples taken
    pub sample_count: u64,
}

impl VoiceSession {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            state: SessionState::Acquiring,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            duration_ms: 0,
            average_loudness_db: crate::audio::SILENCE_FLOOR_DB,
            peak_loudness_db: crate::audio::SILENCE_FLOOR_DB,
            sample_count: 0,
        }
    }
}

/// Result of finalizing a capture session
///
/// Cached by the capture manager, so repeated stops share one instance.
/// The encoded audio can be taken exactly once.
#[derive(Debug)]
pub struct FinalizedCapture {
    pub summary: VoiceSession,
    audio: Mutex<Option<EncodedAudio>>,
    /// Size of the recording, fixed at finalize
    recorded_bytes: usize,
    /// Set when capture degraded to level-only (encoder failed or produced nothing)
    pub error: Option<VoiceError>,
}

impl FinalizedCapture {
    pub fn new(summary: VoiceSession, audio: Option<EncodedAudio>, error: Option<VoiceError>) -> Self {
        let recorded_bytes = audio.as_ref().map_or(0, |a| a.bytes.len());
        Self {
            summary,
            audio: Mutex::new(audio),
            recorded_bytes,
            error,
        }
    }

    /// Transfer ownership of the recorded audio to the caller
    pub fn take_audio(&self) -> Option<EncodedAudio> {
        self.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether anything was recorded, even if the audio was already taken
    pub fn has_audio(&self) -> bool {
        self.recorded_bytes > 0
    }

    pub fn recorded_bytes(&self) -> usize {
        self.recorded_bytes
    }
}
