use std::time::Duration;

use base64::Engine;
use serde::Serialize;
use tracing::{debug, error, info};

use super::TranscriptionResult;
use crate::audio::EncodedAudio;
use crate::error::{Result, VoiceError};

/// Request body of the transcription endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionRequest {
    pub audio_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub language: String,
}

impl TranscriptionRequest {
    /// Consumes the recording; the bytes are not retained
    pub fn from_audio(audio: EncodedAudio, language: &str) -> Self {
        Self {
            audio_base64: base64::engine::general_purpose::STANDARD.encode(&audio.bytes),
            mime_type: Some(audio.mime_type),
            language: language.to_string(),
        }
    }
}

/// Authoritative speech-to-text consulted after a session finalizes
#[async_trait::async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<TranscriptionResult>;
}

/// JSON-over-HTTP transcription endpoint
pub struct HttpTranscriptionService {
    client: reqwest::Client,
    url: String,
}

impl HttpTranscriptionService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl TranscriptionService for HttpTranscriptionService {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<TranscriptionResult> {
        debug!(
            "Sending {} base64 chars to transcription endpoint",
            request.audio_base64.len()
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Transcription request failed: {}", e);
                VoiceError::NetworkFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Transcription endpoint returned {}: {}", status, body);
            return Err(VoiceError::TranscriptionUnavailable(format!(
                "transcription endpoint returned {}",
                status
            )));
        }

        let result: TranscriptionResult = response.json().await.map_err(|e| {
            error!("Malformed transcription response: {}", e);
            VoiceError::TranscriptionUnavailable(format!("malformed response: {}", e))
        })?;

        info!(
            "Remote transcription complete ({} chars, confidence {:.2})",
            result.transcript.len(),
            result.confidence
        );

        Ok(result)
    }
}
