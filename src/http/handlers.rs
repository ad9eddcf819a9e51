use super::state::AppState;
use crate::conversation::ConversationTurn;
use crate::error::VoiceError;
use crate::pipeline::TurnOutcome;
use crate::recognition::FinalizeTrigger;
use crate::session::VoiceSession;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub recognition_available: bool,
    pub microphone_available: bool,
    pub voice_input_available: bool,
    pub playback_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartVoiceResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopVoiceResponse {
    pub session_id: String,
    pub trigger: FinalizeTrigger,
    pub summary: Option<VoiceSession>,
    pub has_audio: bool,
    pub local_transcript: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub transcript: String,
    pub emotional_intensity: f32,
    pub reply: Option<String>,
    /// Banner text for each recoverable problem
    pub warnings: Vec<String>,
}

impl From<&TurnOutcome> for TurnResponse {
    fn from(outcome: &TurnOutcome) -> Self {
        Self {
            transcript: outcome.user.text().to_string(),
            emotional_intensity: outcome.user.meta().emotional_intensity,
            reply: outcome.reply.as_ref().map(|r| r.text().to_string()),
            warnings: outcome.warnings.iter().map(VoiceError::user_message).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: &VoiceError) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.user_message(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /voice/capabilities
pub async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    let capabilities = state.pipeline.capabilities();
    Json(CapabilitiesResponse {
        recognition_available: capabilities.recognition_available,
        microphone_available: capabilities.microphone_available,
        voice_input_available: capabilities.voice_input_available(),
        playback_enabled: state.pipeline.playback().is_enabled(),
    })
}

/// POST /voice/start
/// Start a voice turn; the turn completes in the background
pub async fn start_voice(State(state): State<AppState>) -> impl IntoResponse {
    let session = match state.pipeline.start_voice().await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "A voice session is already active".to_string(),
                }),
            )
                .into_response();
        }
        Err(e) => {
            error!("Failed to start voice session: {}", e);
            let status = if e.is_session_fatal() || e == VoiceError::RecognitionUnavailable {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return error_response(status, &e);
        }
    };

    let pipeline = Arc::clone(&state.pipeline);
    let session_id = session.session_id.clone();
    tokio::spawn(async move {
        match pipeline.finish_voice_turn().await {
            Ok(outcome) => info!(
                "Voice turn {} complete ({} warnings)",
                session_id,
                outcome.warnings.len()
            ),
            Err(e) => warn!("Voice turn {} ended without a turn: {}", session_id, e),
        }
    });

    (
        StatusCode::OK,
        Json(StartVoiceResponse {
            session_id: session.session_id,
            status: "recording".to_string(),
        }),
    )
        .into_response()
}

/// POST /voice/stop
/// Finalize the running session (or return the already finalized one)
pub async fn stop_voice(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.request_stop().await {
        Some(finalized) => {
            info!("Voice session {} stopped", finalized.session_id);
            (
                StatusCode::OK,
                Json(StopVoiceResponse {
                    session_id: finalized.session_id.clone(),
                    trigger: finalized.trigger,
                    summary: finalized.summary().cloned(),
                    has_audio: finalized.capture.as_ref().is_some_and(|c| c.has_audio()),
                    local_transcript: finalized.local_hint().to_string(),
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No voice session".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /voice/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.status().await)
}

/// POST /voice/playback
pub async fn set_playback(
    State(state): State<AppState>,
    Json(req): Json<PlaybackRequest>,
) -> impl IntoResponse {
    state.pipeline.set_playback_enabled(req.enabled).await;
    StatusCode::NO_CONTENT
}

/// POST /conversation/text
/// Send a typed turn
pub async fn send_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> impl IntoResponse {
    match state.pipeline.send_text(&req.text).await {
        Ok(outcome) => (StatusCode::OK, Json(TurnResponse::from(&outcome))).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
    }
}

/// GET /conversation/history
pub async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    let history: Vec<ConversationTurn> = state.pipeline.history().await;
    Json(history)
}
