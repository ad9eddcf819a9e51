use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intensity::{score_intensity, MAX_INTENSITY};
use crate::session::VoiceSession;
use crate::transcription::{ResolvedTranscript, TranscriptSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// How the user produced the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Text,
    Voice,
}

/// Metadata attached to a turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMeta {
    pub source: InputSource,
    /// 0.0 to 10.0
    pub emotional_intensity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_source: Option<TranscriptSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_loudness_db: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_loudness_db: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One immutable entry of the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    role: Role,
    text: String,
    meta: TurnMeta,
    created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn meta(&self) -> &TurnMeta {
        &self.meta
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Builds turns; the intensity heuristic lives here so history and
/// outbound metadata always agree
#[derive(Debug, Default, Clone)]
pub struct ConversationTurnBuilder;

impl ConversationTurnBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Lexicon/punctuation intensity score for `text`
    pub fn intensity(&self, text: &str) -> f32 {
        score_intensity(text)
    }

    /// Build a user turn
    ///
    /// `session` and `transcription` are present for voice turns.
    pub fn build(
        &self,
        transcript: &str,
        intensity: f32,
        session: Option<&VoiceSession>,
        transcription: Option<&ResolvedTranscript>,
    ) -> ConversationTurn {
        let source = if session.is_some() || transcription.is_some() {
            InputSource::Voice
        } else {
            InputSource::Text
        };

        ConversationTurn {
            role: Role::User,
            text: transcript.trim().to_string(),
            meta: TurnMeta {
                source,
                emotional_intensity: intensity.clamp(0.0, MAX_INTENSITY),
                transcription_confidence: transcription.map(|t| t.result.confidence),
                transcript_source: transcription.map(|t| t.source),
                session_id: session.map(|s| s.session_id.clone()),
                duration_ms: session.map(|s| s.duration_ms),
                average_loudness_db: session.map(|s| s.average_loudness_db),
                peak_loudness_db: session.map(|s| s.peak_loudness_db),
                language: transcription.map(|t| t.result.language_code.clone()),
            },
            created_at: Utc::now(),
        }
    }

    /// Voice turn from a resolved transcript, scoring intensity from its text
    pub fn build_voice(
        &self,
        transcription: &ResolvedTranscript,
        session: Option<&VoiceSession>,
    ) -> ConversationTurn {
        let text = transcription.text();
        self.build(text, self.intensity(text), session, Some(transcription))
    }

    /// Typed user turn
    pub fn build_text(&self, text: &str) -> ConversationTurn {
        self.build(text, self.intensity(text), None, None)
    }

    /// Assistant reply
    pub fn build_reply(&self, text: &str, language: Option<&str>) -> ConversationTurn {
        ConversationTurn {
            role: Role::Assistant,
            text: text.trim().to_string(),
            meta: TurnMeta {
                source: InputSource::Text,
                emotional_intensity: 0.0,
                transcription_confidence: None,
                transcript_source: None,
                session_id: None,
                duration_ms: None,
                average_loudness_db: None,
                peak_loudness_db: None,
                language: language.map(str::to_string),
            },
            created_at: Utc::now(),
        }
    }
}

/// Ordered, append-only turn history
#[derive(Debug, Default, Clone, Serialize)]
pub struct TurnHistory {
    turns: Vec<ConversationTurn>,
}

impl TurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }
}
