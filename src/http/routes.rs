use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Voice control
        .route("/voice/capabilities", get(handlers::get_capabilities))
        .route("/voice/start", post(handlers::start_voice))
        .route("/voice/stop", post(handlers::stop_voice))
        .route("/voice/status", get(handlers::get_status))
        .route("/voice/playback", post(handlers::set_playback))
        // Conversation
        .route("/conversation/text", post(handlers::send_text))
        .route("/conversation/history", get(handlers::get_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
