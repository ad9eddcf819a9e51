use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioBackendConfig, LevelCalibration};
use crate::recognition::RecognitionConfig;
use crate::session::CaptureConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub recognition: RecognitionSettings,
    pub endpoints: EndpointsConfig,
    pub playback: PlaybackConfig,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-pipeline".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// `microphone` or `file:<path>`
    pub source: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_ms: u64,
    pub window_size: usize,
    pub min_db: f32,
    pub max_db: f32,
    pub frame_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let calibration = LevelCalibration::default();
        Self {
            source: "microphone".to_string(),
            sample_rate: 16000,
            channels: 1,
            buffer_ms: 100,
            window_size: calibration.window_size,
            min_db: calibration.min_db,
            max_db: calibration.max_db,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub enabled: bool,
    pub language: String,
    pub debounce_ms: u64,
    /// Hard cap on a single recording; unset means no limit
    pub max_duration_secs: Option<u64>,
    pub nats_url: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en-US".to_string(),
            debounce_ms: 450,
            max_duration_secs: None,
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub transcription: String,
    pub conversation: String,
    pub synthesis: String,
    pub timeout_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            transcription: "http://localhost:8080/api/transcribe".to_string(),
            conversation: "http://localhost:8080/api/conversation".to_string(),
            synthesis: "http://localhost:8080/api/synthesize".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Fail the session when the encoder produced no bytes
    pub empty_audio_is_error: bool,
}

impl Config {
    /// Load `path` (extension optional, file may be absent) and overlay
    /// `VOICE_PIPELINE__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_PIPELINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.min_db >= self.audio.max_db {
            anyhow::bail!(
                "audio.min_db ({}) must be below audio.max_db ({})",
                self.audio.min_db,
                self.audio.max_db
            );
        }
        if self.audio.window_size == 0 {
            anyhow::bail!("audio.window_size must be positive");
        }
        if self.audio.frame_interval_ms == 0 {
            anyhow::bail!("audio.frame_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
            buffer_duration_ms: self.audio.buffer_ms,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            calibration: LevelCalibration {
                min_db: self.audio.min_db,
                max_db: self.audio.max_db,
                window_size: self.audio.window_size,
            },
            frame_interval: Duration::from_millis(self.audio.frame_interval_ms),
            empty_audio_is_error: self.capture.empty_audio_is_error,
            ..CaptureConfig::default()
        }
    }

    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            language: self.recognition.language.clone(),
            debounce: Duration::from_millis(self.recognition.debounce_ms),
            max_duration: self.recognition.max_duration_secs.map(Duration::from_secs),
        }
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoints.timeout_secs)
    }
}
