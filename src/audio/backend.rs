use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::{Result, VoiceError};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for speech services
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`device-audio` feature)
/// - File: replays a WAV file in real time (headless runs, demos)
///
/// `start` is the device acquisition point. It fails with
/// [`VoiceError::DeviceUnavailable`] or [`VoiceError::PermissionDenied`].
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Produces a fresh backend for every capture session
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioBackend>>;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// WAV file replayed as if it were a live microphone
    File(PathBuf),
}

impl AudioSource {
    /// Parse `"microphone"` or `"file:<path>"`
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("microphone") || value.eq_ignore_ascii_case("mic") {
            return Ok(AudioSource::Microphone);
        }
        match value.strip_prefix("file:") {
            Some(path) if !path.is_empty() => Ok(AudioSource::File(PathBuf::from(path))),
            _ => Err(VoiceError::Config(format!(
                "unknown audio source '{}' (expected 'microphone' or 'file:<path>')",
                value
            ))),
        }
    }
}

/// Audio backend factory
pub struct AudioBackendFactory {
    source: AudioSource,
    config: AudioBackendConfig,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, config: AudioBackendConfig) -> Self {
        Self { source, config }
    }

    /// Whether this build can open the configured source at all
    pub fn is_available(&self) -> bool {
        match &self.source {
            AudioSource::Microphone => cfg!(feature = "device-audio"),
            AudioSource::File(path) => path.exists(),
        }
    }
}

impl BackendFactory for AudioBackendFactory {
    fn create(&self) -> Result<Box<dyn AudioBackend>> {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "device-audio")]
                {
                    use super::microphone::MicrophoneBackend;
                    Ok(Box::new(MicrophoneBackend::new(self.config.clone())))
                }

                #[cfg(not(feature = "device-audio"))]
                {
                    Err(VoiceError::DeviceUnavailable(
                        "microphone capture requires the 'device-audio' feature".to_string(),
                    ))
                }
            }

            AudioSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::new(path.clone(), self.config.clone())))
            }
        }
    }
}
