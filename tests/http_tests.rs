// HTTP control surface, driven in-process with tower's oneshot

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness, Harness, MockConversation, MockTranscription, ScriptedRecognizer};
use tower::ServiceExt;
use voice_pipeline::{create_router, AppState};

fn router(h: &Harness) -> Router {
    create_router(AppState::new(h.pipeline.clone()))
}

fn silent_harness() -> Harness {
    harness(
        ScriptedRecognizer::silent(),
        MockTranscription::returning("hello", 0.9),
        MockConversation::echo(),
    )
}

async fn json_body(response: axum::response::Response) -> Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn post_json(uri: &str, body: serde_json::Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?)
}

fn empty(method: &str, uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().method(method).uri(uri).body(Body::empty())?)
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let h = silent_harness();
    let response = router(&h).oneshot(empty("GET", "/health")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_capabilities() -> Result<()> {
    let h = silent_harness();
    let response = router(&h).oneshot(empty("GET", "/voice/capabilities")?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await?;
    assert_eq!(body["recognitionAvailable"], true);
    assert_eq!(body["microphoneAvailable"], true);
    assert_eq!(body["voiceInputAvailable"], true);
    assert_eq!(body["playbackEnabled"], true);
    Ok(())
}

#[tokio::test]
async fn test_start_twice_conflicts_then_stop() -> Result<()> {
    let h = silent_harness();
    let app = router(&h);

    let response = app.clone().oneshot(empty("POST", "/voice/start")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let started = json_body(response).await?;
    let session_id = started["sessionId"].as_str().unwrap_or_default().to_string();
    assert!(!session_id.is_empty());

    let response = app.clone().oneshot(empty("POST", "/voice/start")?).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.clone().oneshot(empty("GET", "/voice/status")?).await?;
    let status = json_body(response).await?;
    assert_eq!(status["state"], "active");
    assert_eq!(status["captureState"], "active");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let response = app.clone().oneshot(empty("POST", "/voice/stop")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let stopped = json_body(response).await?;
    assert_eq!(stopped["sessionId"], session_id.as_str());
    assert_eq!(stopped["trigger"], "user_stopped");
    assert_eq!(stopped["hasAudio"], true);
    assert_eq!(h.devices.held(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stop_without_session() -> Result<()> {
    let h = silent_harness();
    let response = router(&h).oneshot(empty("POST", "/voice/stop")?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_text_turn_and_history() -> Result<()> {
    let h = silent_harness();
    let app = router(&h);

    let response = app
        .clone()
        .oneshot(post_json(
            "/conversation/text",
            serde_json::json!({"text": "I hate this, help me please!!"}),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let turn = json_body(response).await?;
    assert_eq!(turn["transcript"], "I hate this, help me please!!");
    assert_eq!(turn["reply"], "You said: I hate this, help me please!!");
    assert!(turn["emotionalIntensity"].as_f64().is_some_and(|v| v > 5.0));

    let response = app.oneshot(empty("GET", "/conversation/history")?).await?;
    let history = json_body(response).await?;
    let turns = history.as_array().cloned().unwrap_or_default();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["meta"]["source"], "text");
    assert_eq!(turns[1]["role"], "assistant");
    Ok(())
}

#[tokio::test]
async fn test_blank_text_is_bad_request() -> Result<()> {
    let h = silent_harness();
    let response = router(&h)
        .oneshot(post_json("/conversation/text", serde_json::json!({"text": "  "}))?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await?;
    assert_eq!(body["error"], "No usable transcript. Please try speaking again.");
    Ok(())
}

#[tokio::test]
async fn test_playback_toggle() -> Result<()> {
    let h = silent_harness();
    let response = router(&h)
        .oneshot(post_json("/voice/playback", serde_json::json!({"enabled": false}))?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!h.pipeline.playback().is_enabled());
    Ok(())
}
