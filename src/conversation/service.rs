use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::turn::{ConversationTurn, InputSource, Role};
use crate::error::{Result, VoiceError};

/// Prior turn as sent to the conversation endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

/// Client-side metadata describing the user turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    pub source: InputSource,
    pub emotional_intensity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMetadata {
    pub client: ClientMeta,
}

/// Request body of the conversation endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRequest {
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub metadata: RequestMetadata,
}

impl ConversationRequest {
    /// `turn` is the new user turn; `history` is everything before it
    pub fn new(turn: &ConversationTurn, history: &[ConversationTurn]) -> Self {
        let meta = turn.meta();
        Self {
            message: turn.text().to_string(),
            history: history
                .iter()
                .map(|t| HistoryEntry {
                    role: t.role(),
                    text: t.text().to_string(),
                })
                .collect(),
            metadata: RequestMetadata {
                client: ClientMeta {
                    source: meta.source,
                    emotional_intensity: meta.emotional_intensity,
                    transcription_confidence: meta.transcription_confidence,
                    session_id: meta.session_id.clone(),
                    duration_ms: meta.duration_ms,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyBody {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyMeta {
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Response body of the conversation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationReply {
    pub response: ReplyBody,
    #[serde(default)]
    pub emotion: Option<serde_json::Value>,
    #[serde(default)]
    pub meta: Option<ReplyMeta>,
}

impl ConversationReply {
    pub fn text(&self) -> &str {
        &self.response.text
    }

    pub fn warnings(&self) -> &[String] {
        self.meta.as_ref().map(|m| m.warnings.as_slice()).unwrap_or(&[])
    }
}

/// Remote assistant that answers user turns
#[async_trait::async_trait]
pub trait ConversationService: Send + Sync {
    async fn send(&self, request: ConversationRequest) -> Result<ConversationReply>;
}

/// JSON-over-HTTP conversation endpoint
pub struct HttpConversationService {
    client: reqwest::Client,
    url: String,
}

impl HttpConversationService {
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
impl ConversationService for HttpConversationService {
    async fn send(&self, request: ConversationRequest) -> Result<ConversationReply> {
        debug!(
            "Sending turn with {} history entries to conversation endpoint",
            request.history.len()
        );

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Conversation request failed: {}", e);
                VoiceError::NetworkFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Conversation endpoint returned {}: {}", status, body);
            return Err(VoiceError::NetworkFailure(format!(
                "conversation endpoint returned {}",
                status
            )));
        }

        let reply: ConversationReply = response.json().await.map_err(|e| {
            error!("Malformed conversation response: {}", e);
            VoiceError::NetworkFailure(format!("malformed response: {}", e))
        })?;

        info!("Conversation reply received ({} chars)", reply.text().len());
        Ok(reply)
    }
}
