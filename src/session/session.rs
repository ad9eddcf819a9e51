use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::config::CaptureConfig;
use super::stats::{FinalizedCapture, SessionState, VoiceSession};
use crate::audio::{
    AudioBackend, AudioEncoder, AudioFrame, AudioLevelMonitor, BackendFactory, EncodedAudio,
    EncoderFactory, LevelStats,
};
use crate::error::{Result, VoiceError};

/// Owns the microphone, level monitor and encoder of the active session
///
/// At most one session is active at a time. `stop()` is idempotent: the
/// first call tears the session down and caches the result, later calls
/// return the cached result until `clear()` or the next `start()`.
pub struct CaptureSessionManager {
    backends: Arc<dyn BackendFactory>,
    encoders: EncoderFactory,
    config: CaptureConfig,
    inner: Arc<Mutex<Inner>>,
    /// Serializes teardown so a second `stop()` waits for the first
    finalize_lock: Arc<Mutex<()>>,
    /// Written only while `inner` is locked; readable without it
    state_tx: watch::Sender<SessionState>,
    level_tx: watch::Sender<f32>,
}

struct Inner {
    session: Option<VoiceSession>,
    active: Option<ActiveCapture>,
    finalized: Option<Arc<FinalizedCapture>>,
}

/// Device, capture task and frame tap of a running session
struct ActiveCapture {
    backend: Box<dyn AudioBackend>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<CaptureOutput>,
    tap: broadcast::Sender<AudioFrame>,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        // Dropping the backend releases the device; the loop must not outlive it
        self.task.abort();
    }
}

struct CaptureOutput {
    stats: LevelStats,
    audio: Option<EncodedAudio>,
    encoder_error: Option<VoiceError>,
}

impl CaptureSessionManager {
    pub fn new(
        backends: Arc<dyn BackendFactory>,
        encoders: EncoderFactory,
        config: CaptureConfig,
    ) -> Self {
        let (level_tx, _) = watch::channel(0.0);
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            backends,
            encoders,
            config,
            inner: Arc::new(Mutex::new(Inner {
                session: None,
                active: None,
                finalized: None,
            })),
            finalize_lock: Arc::new(Mutex::new(())),
            state_tx,
            level_tx,
        }
    }

    /// Acquire the device and begin monitoring and encoding
    ///
    /// Returns `Ok(None)` without side effects if a session is already running.
    pub async fn start(&self) -> Result<Option<VoiceSession>> {
        let mut inner = self.inner.lock().await;

        if self.state().is_busy() {
            warn!("Capture already active; ignoring start");
            return Ok(None);
        }

        inner.finalized = None;
        self.state_tx.send_replace(SessionState::Acquiring);

        let mut session = VoiceSession::new(uuid::Uuid::new_v4().to_string());
        info!("Acquiring audio device for session {}", session.session_id);

        let mut backend = match self.backends.create() {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Device acquisition failed: {}", e);
                self.state_tx.send_replace(SessionState::Idle);
                return Err(e);
            }
        };

        let frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Failed to start {}: {}", backend.name(), e);
                if let Err(release) = backend.stop().await {
                    warn!("Release after failed start also failed: {}", release);
                }
                self.state_tx.send_replace(SessionState::Idle);
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let (tap, _) = broadcast::channel(self.config.tap_capacity.max(1));

        let task = tokio::spawn(run_capture_loop(
            frames,
            stop_rx,
            AudioLevelMonitor::new(self.config.calibration),
            (self.encoders)(),
            tap.clone(),
            self.level_tx.clone(),
            self.config.frame_interval,
        ));

        session.state = SessionState::Active;
        info!(
            "Capture session {} active on {}",
            session.session_id,
            backend.name()
        );

        inner.active = Some(ActiveCapture {
            backend,
            stop_tx: Some(stop_tx),
            task,
            tap,
        });
        inner.session = Some(session.clone());
        self.state_tx.send_replace(SessionState::Active);

        Ok(Some(session))
    }

    /// Finalize the active session
    ///
    /// Returns `None` if no session was ever started. Teardown runs on its
    /// own task, so it completes even if the caller is cancelled.
    pub async fn stop(&self) -> Option<Arc<FinalizedCapture>> {
        let finalize = finalize(
            Arc::clone(&self.inner),
            Arc::clone(&self.finalize_lock),
            self.state_tx.clone(),
            self.level_tx.clone(),
            self.config.empty_audio_is_error,
        );

        match tokio::spawn(finalize).await {
            Ok(result) => result,
            Err(e) => {
                error!("Finalize task failed: {}", e);
                None
            }
        }
    }

    /// Drop the cached result so the manager reports `Idle` again
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        if self.state().is_busy() {
            return;
        }
        inner.finalized = None;
        inner.session = None;
        self.state_tx.send_replace(SessionState::Idle);
    }

    /// Current lifecycle state; never waits on a running teardown
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current (or last) session
    pub async fn session(&self) -> Option<VoiceSession> {
        self.inner.lock().await.session.clone()
    }

    /// Cached result of the last finalize, if any
    pub async fn finalized(&self) -> Option<Arc<FinalizedCapture>> {
        self.inner.lock().await.finalized.clone()
    }

    /// Live frame feed of the active session
    pub async fn subscribe_frames(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|active| active.tap.subscribe())
    }

    /// Normalized input level in [0, 1], updated every level tick
    pub fn level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }
}

async fn finalize(
    shared: Arc<Mutex<Inner>>,
    finalize_lock: Arc<Mutex<()>>,
    state_tx: watch::Sender<SessionState>,
    level_tx: watch::Sender<f32>,
    empty_audio_is_error: bool,
) -> Option<Arc<FinalizedCapture>> {
    let _finalizing = finalize_lock.lock().await;

    // Detach the session, then tear down without holding `shared`
    let (mut active, mut session) = {
        let mut inner = shared.lock().await;

        if let Some(done) = &inner.finalized {
            return Some(Arc::clone(done));
        }

        let mut session = inner.session.clone()?;
        let active = inner.active.take()?;

        session.state = SessionState::Finalizing;
        inner.session = Some(session.clone());
        state_tx.send_replace(SessionState::Finalizing);
        (active, session)
    };

    info!("Finalizing capture session {}", session.session_id);

    if let Some(stop_tx) = active.stop_tx.take() {
        let _ = stop_tx.send(());
    }

    let output = match (&mut active.task).await {
        Ok(output) => Some(output),
        Err(e) => {
            error!("Capture loop for {} failed: {}", session.session_id, e);
            None
        }
    };

    // Release runs whatever happened to the capture loop
    if let Err(e) = active.backend.stop().await {
        warn!("Failed to release {}: {}", active.backend.name(), e);
    }
    drop(active);
    level_tx.send_replace(0.0);

    session.duration_ms = session.started_at.elapsed().as_millis() as u64;

    let (audio, mut error) = match output {
        Some(output) => {
            session.average_loudness_db = output.stats.average_db;
            session.peak_loudness_db = output.stats.peak_db;
            session.sample_count = output.stats.sample_count;
            (output.audio, output.encoder_error)
        }
        None => (
            None,
            Some(VoiceError::EncoderFailure("capture loop aborted".to_string())),
        ),
    };

    let rejected_empty = audio.is_none() && error.is_none() && empty_audio_is_error;
    if rejected_empty {
        error = Some(VoiceError::EncoderFailure(
            "recording produced no audio".to_string(),
        ));
    }

    session.state = if rejected_empty {
        SessionState::Errored
    } else {
        SessionState::Finalized
    };

    info!(
        "Session {} finalized: {}ms, avg {:.1}dB, peak {:.1}dB, {} level samples, audio={}",
        session.session_id,
        session.duration_ms,
        session.average_loudness_db,
        session.peak_loudness_db,
        session.sample_count,
        audio.as_ref().map(|a| a.bytes.len()).unwrap_or(0)
    );

    let finalized = Arc::new(FinalizedCapture::new(session.clone(), audio, error));
    let mut inner = shared.lock().await;
    inner.session = Some(session.clone());
    inner.finalized = Some(Arc::clone(&finalized));
    state_tx.send_replace(session.state);

    Some(finalized)
}

async fn run_capture_loop(
    mut frames: tokio::sync::mpsc::Receiver<AudioFrame>,
    mut stop_rx: oneshot::Receiver<()>,
    mut monitor: AudioLevelMonitor,
    encoder: Box<dyn AudioEncoder>,
    tap: broadcast::Sender<AudioFrame>,
    level_tx: watch::Sender<f32>,
    frame_interval: Duration,
) -> CaptureOutput {
    let mut encoder = Some(encoder);
    let mut encoder_error = None;
    let mut input_open = true;

    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Stop requested, or the session was dropped
            _ = &mut stop_rx => break,

            frame = frames.recv(), if input_open => match frame {
                Some(frame) => {
                    monitor.push_frame(&frame);

                    if let Some(active) = encoder.as_mut() {
                        if let Err(e) = active.encode(&frame) {
                            warn!("Encoder failed, continuing level-only: {}", e);
                            encoder_error = Some(e);
                            encoder = None;
                        }
                    }

                    // No subscribers is fine
                    let _ = tap.send(frame);
                }
                None => {
                    info!("Audio input ended");
                    input_open = false;
                    // Count the tail, then let the meter fall to silence
                    monitor.sample();
                    level_tx.send_replace(0.0);
                }
            },

            _ = ticker.tick(), if input_open => {
                level_tx.send_replace(monitor.sample());
            }
        }
    }

    let audio = match encoder {
        Some(encoder) => match encoder.finish().await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Encoder flush failed: {}", e);
                encoder_error = Some(e);
                None
            }
        },
        None => None,
    };

    CaptureOutput {
        stats: monitor.stats(),
        audio,
        encoder_error,
    }
}
