use std::sync::Arc;

use crate::pipeline::VoicePipeline;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VoicePipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<VoicePipeline>) -> Self {
        Self { pipeline }
    }
}
