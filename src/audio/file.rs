use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Result, VoiceError};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) => VoiceError::DeviceUnavailable(format!(
                "cannot open {}: {}",
                path.display(),
                io
            )),
            other => VoiceError::DeviceUnavailable(format!(
                "invalid WAV file {}: {}",
                path.display(),
                other
            )),
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to read samples: {}", e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into frames of `frame_ms` milliseconds
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = ((self.sample_rate as u64 * frame_ms / 1000) as usize).max(1)
            * self.channels.max(1) as usize;

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Replays a WAV file in real time, as if it were a microphone
///
/// The frame channel closes once the file has been fully played.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            return Err(VoiceError::DeviceUnavailable("already capturing".to_string()));
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| VoiceError::DeviceUnavailable(format!("file reader failed: {}", e)))??;

        let frame_ms = self.config.buffer_duration_ms.max(1);
        let frames = audio.frames(frame_ms);
        let (tx, rx) = mpsc::channel(64);

        info!(
            "Replaying {} as live input ({} frames of {}ms)",
            audio.path,
            frames.len(),
            frame_ms
        );

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for frame in frames {
                ticker.tick().await;
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("File replay task failed: {}", e);
                }
            }
            info!("File input stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
