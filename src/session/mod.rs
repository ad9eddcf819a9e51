//! Capture session management
//!
//! This module provides the `CaptureSessionManager` that owns:
//! - Microphone acquisition and release
//! - The per-frame loudness loop
//! - Encoding of the recording
//! - The idempotent, cached finalize

mod config;
mod session;
mod stats;

pub use config::CaptureConfig;
pub use session::CaptureSessionManager;
pub use stats::{FinalizedCapture, SessionState, VoiceSession};
