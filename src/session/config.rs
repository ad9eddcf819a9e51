use std::time::Duration;

use crate::audio::LevelCalibration;

/// Configuration for capture sessions
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Level meter calibration and window size
    pub calibration: LevelCalibration,

    /// Interval between level samples (one "display frame")
    /// Default: 16ms
    pub frame_interval: Duration,

    /// Treat a recording that produced no bytes as a failure
    /// instead of a level-only summary
    pub empty_audio_is_error: bool,

    /// Capacity of the frame tap feeding the local recognizer
    pub tap_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            calibration: LevelCalibration::default(),
            frame_interval: Duration::from_millis(16),
            empty_audio_is_error: false,
            tap_capacity: 256,
        }
    }
}
