use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::AudioFrameMessage;
use crate::error::{Result, VoiceError};

/// Subject prefix for transcripts (`stt.text.partial`, `stt.text.final`)
pub const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

/// Subject for recognizer errors
pub const ERROR_SUBJECT: &str = "stt.error";

pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .map_err(|e| VoiceError::NetworkFailure(format!("NATS connect failed: {}", e)))?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        language: &str,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.{}", self.session_id);

        let message = AudioFrameMessage {
            session_id: self.session_id.clone(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            language: language.to_string(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)
            .map_err(|e| VoiceError::NetworkFailure(format!("frame serialization: {}", e)))?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| VoiceError::NetworkFailure(format!("publish failed: {}", e)))?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject,
            sequence,
            pcm_bytes.len(),
            is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages
    ///
    /// The STT service publishes for every session; callers filter by
    /// `session_id` in the payload.
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        self.subscribe(TRANSCRIPT_SUBJECT).await
    }

    /// Subscribe to recognizer error reports
    pub async fn subscribe_errors(&self) -> Result<async_nats::Subscriber> {
        self.subscribe(ERROR_SUBJECT).await
    }

    async fn subscribe(&self, subject: &'static str) -> Result<async_nats::Subscriber> {
        info!("Subscribing to {}", subject);

        self.client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| VoiceError::NetworkFailure(format!("subscribe to {} failed: {}", subject, e)))
    }

    /// Flush pending publishes
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| VoiceError::NetworkFailure(format!("flush failed: {}", e)))
    }
}
