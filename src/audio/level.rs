// Real-time loudness metering for the capture loop
//
// The monitor keeps a fixed-size ring window of the most recent samples.
// Each call to `sample()` computes the RMS of that window, converts it to
// decibels and maps the calibration range linearly onto [0, 1]. The window
// is allocated once; pushing frames and sampling never allocate.

use super::backend::AudioFrame;

/// dB value reported for digital silence (instead of -inf)
pub const SILENCE_FLOOR_DB: f32 = -100.0;

/// Calibration for the level meter
#[derive(Debug, Clone, Copy)]
pub struct LevelCalibration {
    /// Loudness mapped to 0.0
    pub min_db: f32,
    /// Loudness mapped to 1.0
    pub max_db: f32,
    /// Number of samples in the analysis window
    pub window_size: usize,
}

impl Default for LevelCalibration {
    fn default() -> Self {
        Self {
            min_db: -90.0,
            max_db: -10.0,
            window_size: 2048,
        }
    }
}

/// Running loudness statistics for one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelStats {
    pub average_db: f32,
    pub peak_db: f32,
    pub sample_count: u64,
}

/// Samples a live signal and tracks session loudness
pub struct AudioLevelMonitor {
    calibration: LevelCalibration,
    window: Vec<f32>,
    write_pos: usize,
    filled: usize,
    db_sum: f64,
    peak_db: f32,
    sample_count: u64,
}

impl AudioLevelMonitor {
    pub fn new(calibration: LevelCalibration) -> Self {
        let window_size = calibration.window_size.max(1);
        Self {
            calibration,
            window: vec![0.0; window_size],
            write_pos: 0,
            filled: 0,
            db_sum: 0.0,
            peak_db: SILENCE_FLOOR_DB,
            sample_count: 0,
        }
    }

    /// Feed captured PCM into the analysis window
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        self.push_samples(&frame.samples);
    }

    pub fn push_samples(&mut self, samples: &[i16]) {
        let len = self.window.len();
        for &s in samples {
            self.window[self.write_pos] = s as f32 / 32768.0;
            self.write_pos = (self.write_pos + 1) % len;
        }
        self.filled = (self.filled + samples.len()).min(len);
    }

    /// Normalized loudness of the current window in [0, 1]
    ///
    /// Also updates the running average and peak.
    pub fn sample(&mut self) -> f32 {
        let db = self.window_db();

        self.db_sum += db as f64;
        self.sample_count += 1;
        if db > self.peak_db {
            self.peak_db = db;
        }

        self.normalize(db)
    }

    /// Loudness of the current window in dB, floored at [`SILENCE_FLOOR_DB`]
    pub fn window_db(&self) -> f32 {
        if self.filled == 0 {
            return SILENCE_FLOOR_DB;
        }

        // Samples are already zero-centered; unfilled slots are skipped
        let sum_sq: f32 = self.window[..self.filled].iter().map(|s| s * s).sum();
        let rms = (sum_sq / self.filled as f32).sqrt();

        rms_to_db(rms)
    }

    fn normalize(&self, db: f32) -> f32 {
        let LevelCalibration { min_db, max_db, .. } = self.calibration;
        if max_db <= min_db {
            return 0.0;
        }
        ((db - min_db) / (max_db - min_db)).clamp(0.0, 1.0)
    }

    pub fn stats(&self) -> LevelStats {
        let average_db = if self.sample_count == 0 {
            SILENCE_FLOOR_DB
        } else {
            (self.db_sum / self.sample_count as f64) as f32
        };

        LevelStats {
            average_db,
            peak_db: self.peak_db,
            sample_count: self.sample_count,
        }
    }
}

/// `20·log10(rms)`, clamped to the silence floor
pub fn rms_to_db(rms: f32) -> f32 {
    if rms <= 0.0 {
        return SILENCE_FLOOR_DB;
    }
    (20.0 * rms.log10()).max(SILENCE_FLOOR_DB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_maps_to_zero() {
        let mut monitor = AudioLevelMonitor::new(LevelCalibration::default());
        monitor.push_samples(&[0i16; 512]);
        assert_eq!(monitor.sample(), 0.0);
        assert_eq!(monitor.stats().peak_db, SILENCE_FLOOR_DB);
    }

    #[test]
    fn test_full_scale_square_wave_maps_to_one() {
        let mut monitor = AudioLevelMonitor::new(LevelCalibration::default());
        let samples: Vec<i16> = (0..2048)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        monitor.push_samples(&samples);
        assert!((monitor.sample() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rms_to_db_floor() {
        assert_eq!(rms_to_db(0.0), SILENCE_FLOOR_DB);
        assert!((rms_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((rms_to_db(0.1) + 20.0).abs() < 1e-4);
    }
}
