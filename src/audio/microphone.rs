// Microphone backend using cpal
//
// cpal streams are not Send on every platform, so the stream lives on a
// dedicated thread for the whole capture and is dropped there on stop.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Result, VoiceError};

/// Default input device capture
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            return Err(VoiceError::DeviceUnavailable("already capturing".to_string()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(128);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(config, frame_tx, ready_tx, stop_rx))
            .map_err(|e| VoiceError::DeviceUnavailable(format!("capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!("Microphone capture started on '{}'", device_name);
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(VoiceError::DeviceUnavailable(
                    "capture thread exited before the device opened".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    error!("Microphone capture thread panicked");
                }
            })
            .await
            .map_err(|e| VoiceError::DeviceUnavailable(format!("release failed: {}", e)))?;
            info!("Microphone released");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn run_capture(
    config: AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<String>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(
                "no input device available".to_string(),
            )));
            return;
        }
    };
    let device_name = device.name().unwrap_or_else(|_| "<unknown>".to_string());

    let supported = match device.default_input_config() {
        Ok(supported) => supported,
        Err(e) => {
            let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(e.to_string())));
            return;
        }
    };

    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.config();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;

    if sample_rate != config.target_sample_rate || channels != config.target_channels {
        info!(
            "Capturing at native {}Hz/{}ch (requested {}Hz/{}ch)",
            sample_rate, channels, config.target_sample_rate, config.target_channels
        );
    }

    let started = Instant::now();
    let on_error = |err: cpal::StreamError| error!("Microphone stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::I16 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    forward(&tx, data.to_vec(), sample_rate, channels, started);
                },
                on_error,
                None,
            )
        }
        SampleFormat::F32 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples = data
                        .iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    forward(&tx, samples, sample_rate, channels, started);
                },
                on_error,
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(format!(
                "unsupported input sample format {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(map_build_error(e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(VoiceError::DeviceUnavailable(e.to_string())));
        return;
    }

    if ready_tx.send(Ok(device_name)).is_err() {
        return;
    }

    // Park until stop is requested or the backend is dropped
    let _ = stop_rx.recv();
    drop(stream);
}

fn forward(
    tx: &mpsc::Sender<AudioFrame>,
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    started: Instant,
) {
    let frame = AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: started.elapsed().as_millis() as u64,
    };
    // Never block the audio callback
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(frame) {
        warn!("Capture consumer lagging; dropped a frame");
    }
}

fn map_build_error(e: BuildStreamError) -> VoiceError {
    match e {
        BuildStreamError::DeviceNotAvailable => {
            VoiceError::DeviceUnavailable("input device not available".to_string())
        }
        BuildStreamError::BackendSpecific { err } => {
            let description = err.description;
            if description.to_lowercase().contains("permission")
                || description.to_lowercase().contains("denied")
            {
                VoiceError::PermissionDenied(description)
            } else {
                VoiceError::DeviceUnavailable(description)
            }
        }
        other => VoiceError::DeviceUnavailable(other.to_string()),
    }
}
