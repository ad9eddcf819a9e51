use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::audio::DecodedAudio;
use crate::error::Result;

/// Caller side of one playback
#[derive(Debug)]
pub struct PlaybackHandle {
    generation: u64,
    stop_tx: watch::Sender<bool>,
    finished_rx: watch::Receiver<bool>,
}

/// Output side of one playback
#[derive(Debug, Clone)]
pub struct PlaybackControl {
    stop_rx: watch::Receiver<bool>,
    finished_tx: std::sync::Arc<watch::Sender<bool>>,
}

impl PlaybackHandle {
    pub fn new(generation: u64) -> (Self, PlaybackControl) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(false);
        (
            Self {
                generation,
                stop_tx,
                finished_rx,
            },
            PlaybackControl {
                stop_rx,
                finished_tx: std::sync::Arc::new(finished_tx),
            },
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the output to stop; idempotent
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        *self.finished_rx.borrow()
    }

    /// Receiver that flips to `true` once playback ended or was stopped
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.finished_rx.clone()
    }

    /// Stop and wait until the output reports it has gone silent
    ///
    /// Returns `false` if the output did not finish within `grace`.
    pub async fn stop_and_wait(&self, grace: Duration) -> bool {
        self.stop();
        let mut finished = self.finished();
        let done = matches!(
            tokio::time::timeout(grace, finished.wait_for(|done| *done)).await,
            Ok(Ok(_))
        );
        done
    }
}

impl PlaybackControl {
    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolves once the handle requested a stop (or was dropped)
    pub async fn stopped(&mut self) {
        let _ = self.stop_rx.wait_for(|stop| *stop).await;
    }

    pub fn finish(&self) {
        self.finished_tx.send_replace(true);
    }
}

/// Something that can play decoded audio
///
/// `play` returns once playback has started. The output must end promptly
/// when the control is stopped, and call [`PlaybackControl::finish`] in
/// every case.
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, audio: DecodedAudio, control: PlaybackControl) -> Result<()>;

    fn name(&self) -> &str;
}

/// Output that only waits out the audio's duration
///
/// Used on hosts without a speaker and in headless runs.
#[derive(Debug, Default)]
pub struct SilentOutput;

#[async_trait::async_trait]
impl AudioOutput for SilentOutput {
    async fn play(&self, audio: DecodedAudio, mut control: PlaybackControl) -> Result<()> {
        let duration = Duration::from_millis(audio.duration_ms());
        debug!("Silent playback for {:?}", duration);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = control.stopped() => debug!("Silent playback stopped early"),
            }
            control.finish();
        });

        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

#[cfg(feature = "device-audio")]
pub use device::CpalOutput;

#[cfg(feature = "device-audio")]
mod device {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tokio::sync::oneshot;
    use tracing::{debug, error, info};

    use super::{AudioOutput, PlaybackControl};
    use crate::audio::DecodedAudio;
    use crate::error::{Result, VoiceError};

    /// Default speaker via cpal; each playback owns a stream on its own thread
    #[derive(Debug, Default)]
    pub struct CpalOutput;

    impl CpalOutput {
        pub fn new() -> Self {
            Self
        }

        pub fn is_available() -> bool {
            cpal::default_host().default_output_device().is_some()
        }
    }

    #[async_trait::async_trait]
    impl AudioOutput for CpalOutput {
        async fn play(&self, audio: DecodedAudio, control: PlaybackControl) -> Result<()> {
            let (ready_tx, ready_rx) = oneshot::channel();

            std::thread::Builder::new()
                .name("speaker-playback".to_string())
                .spawn(move || run_stream(audio, control, ready_tx))
                .map_err(|e| VoiceError::SynthesisOrPlaybackFailure(e.to_string()))?;

            ready_rx.await.map_err(|_| {
                VoiceError::SynthesisOrPlaybackFailure("playback thread exited".to_string())
            })?
        }

        fn name(&self) -> &str {
            "cpal"
        }
    }

    fn run_stream(
        audio: DecodedAudio,
        control: PlaybackControl,
        ready_tx: oneshot::Sender<Result<()>>,
    ) {
        let (stream, done) = match build_stream(&audio) {
            Ok(built) => built,
            Err(e) => {
                control.finish();
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        if let Err(e) = stream.play() {
            control.finish();
            let _ = ready_tx.send(Err(VoiceError::SynthesisOrPlaybackFailure(e.to_string())));
            return;
        }
        let _ = ready_tx.send(Ok(()));

        let timeout = Duration::from_millis(audio.duration_ms() + 500);
        let started = std::time::Instant::now();
        while !done.load(Ordering::Relaxed) && !control.is_stopped() && started.elapsed() < timeout {
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        control.finish();
        debug!("Speaker playback finished");
    }

    fn build_stream(audio: &DecodedAudio) -> Result<(cpal::Stream, Arc<AtomicBool>)> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| VoiceError::SynthesisOrPlaybackFailure("no output device".to_string()))?;

        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| VoiceError::SynthesisOrPlaybackFailure(e.to_string()))?
            .into();

        info!(
            "Playing {}ms of audio at {} Hz on {}",
            audio.duration_ms(),
            config.sample_rate.0,
            device.name().unwrap_or_default()
        );

        let mono = to_mono(audio);
        let step = audio.sample_rate as f64 / config.sample_rate.0 as f64;
        let out_channels = config.channels as usize;
        let position = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let done_cb = Arc::clone(&done);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut frame_index = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(out_channels) {
                        let source = (frame_index as f64 * step) as usize;
                        let sample = match mono.get(source) {
                            Some(s) => *s,
                            None => {
                                done_cb.store(true, Ordering::Relaxed);
                                0.0
                            }
                        };
                        frame.iter_mut().for_each(|out| *out = sample);
                        frame_index += 1;
                    }
                    position.store(frame_index, Ordering::Relaxed);
                },
                |err: cpal::StreamError| error!("Playback stream error: {}", err),
                None,
            )
            .map_err(|e| VoiceError::SynthesisOrPlaybackFailure(e.to_string()))?;

        Ok((stream, done))
    }

    fn to_mono(audio: &DecodedAudio) -> Vec<f32> {
        let channels = audio.channels.max(1) as usize;
        audio
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}
