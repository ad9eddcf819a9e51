// Transcript precedence, local fallback and the HTTP transcription client

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::{http::StatusCode, routing::post, Json, Router};
use common::{encoded_audio, spawn_server, MockTranscription};
use voice_pipeline::conversation::ConversationTurnBuilder;
use voice_pipeline::error::VoiceError;
use voice_pipeline::transcription::{
    HttpTranscriptionService, TranscriptSource, TranscriptionHandoff, TranscriptionRequest,
    TranscriptionResult, TranscriptionService,
};

#[tokio::test]
async fn test_remote_transcript_takes_precedence() -> Result<()> {
    let service = MockTranscription::returning("hello", 0.9);
    let handoff = TranscriptionHandoff::new(service.clone(), "en-US");

    let resolved = handoff.transcribe(encoded_audio(), "helo").await?;
    assert_eq!(resolved.text(), "hello");
    assert_eq!(resolved.source, TranscriptSource::Remote);
    assert!((resolved.result.confidence - 0.9).abs() < 1e-6);
    assert!(resolved.warnings.is_empty());

    let turn = ConversationTurnBuilder::new().build_voice(&resolved, None);
    assert_eq!(turn.text(), "hello");

    let request = service.last_request.lock().unwrap().take().expect("request sent");
    assert_eq!(request.mime_type.as_deref(), Some("audio/wav"));
    assert_eq!(request.language, "en-US");
    assert!(!request.audio_base64.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_remote_failure_falls_back_to_local_hint() -> Result<()> {
    let handoff = TranscriptionHandoff::new(MockTranscription::failing(), "en-US");

    let resolved = handoff.transcribe(encoded_audio(), "I need help").await?;
    assert_eq!(resolved.text(), "I need help");
    assert_eq!(resolved.source, TranscriptSource::Local);
    assert_eq!(resolved.warnings.len(), 1);
    assert!(matches!(
        resolved.warnings[0],
        VoiceError::TranscriptionUnavailable(_)
    ));

    let turn = ConversationTurnBuilder::new().build_voice(&resolved, None);
    assert_eq!(turn.text(), "I need help");
    Ok(())
}

#[tokio::test]
async fn test_no_transcript_abandons_turn() {
    let handoff = TranscriptionHandoff::new(MockTranscription::failing(), "en-US");

    let err = handoff.transcribe(encoded_audio(), "   ").await.unwrap_err();
    assert_eq!(err, VoiceError::NoUsableTranscript);
    assert_eq!(
        err.user_message(),
        "No usable transcript. Please try speaking again."
    );
}

#[tokio::test]
async fn test_empty_remote_transcript_counts_as_failure() -> Result<()> {
    let handoff = TranscriptionHandoff::new(MockTranscription::returning("  ", 0.99), "en-US");

    let resolved = handoff.transcribe(encoded_audio(), "turn left").await?;
    assert_eq!(resolved.text(), "turn left");
    assert_eq!(resolved.source, TranscriptSource::Local);
    assert_eq!(resolved.warnings.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_level_only_capture_skips_remote_call() -> Result<()> {
    let service = MockTranscription::returning("should not be used", 0.9);
    let handoff = TranscriptionHandoff::new(service.clone(), "en-US");
    let local = TranscriptionResult::new("good morning", 0.6, "en-US");

    let resolved = handoff.resolve(None, Some(&local)).await?;
    assert_eq!(resolved.text(), "good morning");
    assert_eq!(resolved.source, TranscriptSource::Local);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_http_service_posts_camel_case_request() -> Result<()> {
    let seen: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&seen);

    let app = Router::new().route(
        "/transcribe",
        post(move |Json(body): Json<serde_json::Value>| {
            let captured = Arc::clone(&captured);
            async move {
                *captured.lock().unwrap() = Some(body);
                Json(serde_json::json!({
                    "transcript": "hello",
                    "confidence": 0.9,
                    "languageCode": "en-US",
                    "words": [{"word": "hello", "start": 0.0}]
                }))
            }
        }),
    );
    let base = spawn_server(app).await?;

    let service = HttpTranscriptionService::new(format!("{}/transcribe", base), Duration::from_secs(5))?;
    let request = TranscriptionRequest::from_audio(encoded_audio(), "en-US");
    let result = service.transcribe(request).await?;

    assert_eq!(result.transcript, "hello");
    assert_eq!(result.language_code, "en-US");
    assert_eq!(result.words.as_ref().map(Vec::len), Some(1));

    let body = seen.lock().unwrap().take().expect("request body");
    assert!(body["audioBase64"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(body["mimeType"], "audio/wav");
    assert_eq!(body["language"], "en-US");
    Ok(())
}

#[tokio::test]
async fn test_http_service_reports_unavailable_on_error_status() -> Result<()> {
    let app = Router::new().route(
        "/transcribe",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let base = spawn_server(app).await?;

    let service = HttpTranscriptionService::new(format!("{}/transcribe", base), Duration::from_secs(5))?;
    let err = service
        .transcribe(TranscriptionRequest::from_audio(encoded_audio(), "en-US"))
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::TranscriptionUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_http_service_rejects_malformed_body() -> Result<()> {
    let app = Router::new().route(
        "/transcribe",
        post(|| async { Json(serde_json::json!({"text": "wrong shape"})) }),
    );
    let base = spawn_server(app).await?;

    let service = HttpTranscriptionService::new(format!("{}/transcribe", base), Duration::from_secs(5))?;
    let handoff = TranscriptionHandoff::new(Arc::new(service), "en-US");

    // Malformed remote payload degrades to the local hint
    let resolved = handoff.transcribe(encoded_audio(), "fallback text").await?;
    assert_eq!(resolved.text(), "fallback text");
    assert_eq!(resolved.warnings.len(), 1);
    Ok(())
}
