//! HTTP control surface for the voice pipeline
//!
//! - GET  /health - Health check
//! - GET  /voice/capabilities - Recognition/microphone availability
//! - POST /voice/start - Start a voice turn in the background
//! - POST /voice/stop - Finalize the running session
//! - GET  /voice/status - State, live level and banner
//! - POST /voice/playback - Enable or disable spoken replies
//! - POST /conversation/text - Typed turn
//! - GET  /conversation/history - Turn history

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, TurnResponse};
pub use routes::create_router;
pub use state::AppState;
