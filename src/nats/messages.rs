use serde::{Deserialize, Serialize};

/// Audio frame message published to the local STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    pub language: String,
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from the local STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Error reported by the local STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizerErrorMessage {
    pub session_id: String,
    /// "network", "not-allowed", "no-speech", "aborted", ...
    pub error: String,
}
