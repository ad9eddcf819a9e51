use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, VoiceError};

/// Request body of the synthesis endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
}

/// Synthesized speech ready for decoding
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisResponse {
    audio_base64: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Text-to-speech
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio>;
}

/// JSON-over-HTTP synthesis endpoint returning base64 audio
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
}

impl HttpSynthesizer {
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
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio> {
        debug!("Synthesizing {} chars", request.text.len());

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Synthesis request failed: {}", e);
                VoiceError::SynthesisOrPlaybackFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::SynthesisOrPlaybackFailure(format!(
                "synthesis endpoint returned {}",
                status
            )));
        }

        let body: SynthesisResponse = response.json().await.map_err(|e| {
            VoiceError::SynthesisOrPlaybackFailure(format!("malformed response: {}", e))
        })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body.audio_base64.as_bytes())
            .map_err(|e| VoiceError::SynthesisOrPlaybackFailure(format!("bad audio payload: {}", e)))?;

        Ok(SynthesizedAudio {
            bytes,
            mime_type: body.mime_type.unwrap_or_else(|| "audio/mpeg".to_string()),
        })
    }
}
