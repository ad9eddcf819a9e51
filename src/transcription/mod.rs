//! Remote transcription and transcript reconciliation

mod handoff;
mod service;

pub use handoff::{ResolvedTranscript, TranscriptionHandoff};
pub use service::{HttpTranscriptionService, TranscriptionRequest, TranscriptionService};

use serde::{Deserialize, Serialize};

/// Speech-to-text result from either the local recognizer or the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResult {
    pub transcript: String,
    /// 0.0 to 1.0
    pub confidence: f32,
    #[serde(default)]
    pub language_code: String,
    /// Word-level tokens, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<serde_json::Value>>,
}

impl TranscriptionResult {
    pub fn new(transcript: impl Into<String>, confidence: f32, language_code: &str) -> Self {
        Self {
            transcript: transcript.into(),
            confidence: confidence.clamp(0.0, 1.0),
            language_code: language_code.to_string(),
            words: None,
        }
    }
}

/// Which recognizer produced the transcript that was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptSource {
    Local,
    Remote,
}
