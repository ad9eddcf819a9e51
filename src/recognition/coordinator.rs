// Finalize arbitration between the recognizer and explicit stops
//
// Every session gets one driver task. The driver is the only place that
// finalizes: it owns the control channel (explicit stop requests), the
// recognizer event channel and the debounce timer armed by recognizer
// completion. Whichever trigger fires first ends the select loop; the
// result is published on a watch channel that every caller reads.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{RecognizerEvent, SpeechRecognizer};
use crate::error::{Result, VoiceError};
use crate::session::{CaptureSessionManager, FinalizedCapture, VoiceSession};
use crate::transcription::TranscriptionResult;

/// Configuration for coordinated sessions
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Recognition language (BCP-47)
    pub language: String,

    /// Delay between recognizer completion and finalize
    /// Default: 450ms
    pub debounce: Duration,

    /// Optional hard cap on recording length
    pub max_duration: Option<Duration>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            debounce: Duration::from_millis(450),
            max_duration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Acquiring,
    Active,
    RecognizerEnded,
    UserStopped,
    Finalizing,
    Done,
    Errored,
}

/// What ended the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeTrigger {
    RecognizerEnded,
    RecognizerError,
    UserStopped,
    MaxDuration,
    Shutdown,
}

/// A coordinated session after finalize
#[derive(Debug)]
pub struct FinalizedSession {
    pub session_id: String,
    pub trigger: FinalizeTrigger,
    /// Capture result; `None` only if the capture was torn down elsewhere
    pub capture: Option<Arc<FinalizedCapture>>,
    /// Text accumulated by the local recognizer
    pub local: Option<TranscriptionResult>,
    /// User-facing error raised by the recognizer, if any
    pub recognizer_error: Option<VoiceError>,
}

impl FinalizedSession {
    /// Local recognizer text, empty if it heard nothing
    pub fn local_hint(&self) -> &str {
        self.local
            .as_ref()
            .map(|l| l.transcript.as_str())
            .unwrap_or("")
    }

    pub fn summary(&self) -> Option<&VoiceSession> {
        self.capture.as_ref().map(|c| &c.summary)
    }
}

enum Control {
    Stop(FinalizeTrigger),
}

struct SessionHandle {
    session_id: String,
    control_tx: mpsc::Sender<Control>,
    result_rx: watch::Receiver<Option<Arc<FinalizedSession>>>,
    driver: JoinHandle<()>,
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Only reached once a newer session replaces a finished one
        if !self.driver.is_finished() {
            self.driver.abort();
        }
    }
}

/// Runs the capture session and the local recognizer together
pub struct RecognitionCoordinator {
    capture: Arc<CaptureSessionManager>,
    recognizer: Arc<Mutex<Box<dyn SpeechRecognizer>>>,
    config: RecognitionConfig,
    current: Mutex<Option<SessionHandle>>,
    state_tx: watch::Sender<CoordinatorState>,
}

impl RecognitionCoordinator {
    pub fn new(
        capture: Arc<CaptureSessionManager>,
        recognizer: Box<dyn SpeechRecognizer>,
        config: RecognitionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::Idle);
        Self {
            capture,
            recognizer: Arc::new(Mutex::new(recognizer)),
            config,
            current: Mutex::new(None),
            state_tx,
        }
    }

    /// Start capture and recognition together
    ///
    /// Returns `Ok(None)` if a session is already running. Device errors are
    /// returned directly; recognizer start errors are reported through the
    /// finalized session instead, after a normal teardown.
    pub async fn start(&self) -> Result<Option<VoiceSession>> {
        let mut current = self.current.lock().await;

        if current
            .as_ref()
            .is_some_and(|h| h.result_rx.borrow().is_none())
        {
            warn!("Voice session already running; ignoring start");
            return Ok(None);
        }

        self.state_tx.send_replace(CoordinatorState::Acquiring);

        let session = match self.capture.start().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                // Capture is held by someone else; do not disturb it
                self.state_tx.send_replace(CoordinatorState::Idle);
                return Ok(None);
            }
            Err(e) => {
                error!("Voice session failed to acquire input: {}", e);
                self.state_tx.send_replace(CoordinatorState::Errored);
                return Err(e);
            }
        };

        self.state_tx.send_replace(CoordinatorState::Active);

        let mut initial_error = None;
        let events = match self.capture.subscribe_frames().await {
            Some(frames) => {
                let mut recognizer = self.recognizer.lock().await;
                match recognizer
                    .start(&session.session_id, frames, &self.config.language)
                    .await
                {
                    Ok(events) => {
                        info!(
                            "Recognizer '{}' started for session {}",
                            recognizer.name(),
                            session.session_id
                        );
                        Some(events)
                    }
                    Err(e) => {
                        warn!("Recognizer failed to start: {}", e);
                        initial_error = Some(e);
                        None
                    }
                }
            }
            None => None,
        };

        let (control_tx, control_rx) = mpsc::channel(8);
        let (result_tx, result_rx) = watch::channel(None);

        let driver = tokio::spawn(drive_session(Driver {
            session_id: session.session_id.clone(),
            language: self.config.language.clone(),
            capture: Arc::clone(&self.capture),
            recognizer: Arc::clone(&self.recognizer),
            events,
            control_rx,
            debounce: self.config.debounce,
            max_duration: self.config.max_duration,
            initial_error,
            result_tx,
            state_tx: self.state_tx.clone(),
        }));

        *current = Some(SessionHandle {
            session_id: session.session_id.clone(),
            control_tx,
            result_rx,
            driver,
        });

        Ok(Some(session))
    }

    /// Explicit stop (user pressed stop)
    ///
    /// Finalizes immediately, cancelling a pending debounce. If the session
    /// already finalized, returns the same cached result.
    pub async fn stop(&self) -> Option<Arc<FinalizedSession>> {
        self.request_finalize(FinalizeTrigger::UserStopped).await
    }

    /// Component teardown; same path as an explicit stop
    pub async fn shutdown(&self) -> Option<Arc<FinalizedSession>> {
        self.request_finalize(FinalizeTrigger::Shutdown).await
    }

    /// Wait for the current session to finalize by whichever path wins
    pub async fn wait_finalized(&self) -> Option<Arc<FinalizedSession>> {
        let mut result_rx = {
            let current = self.current.lock().await;
            current.as_ref()?.result_rx.clone()
        };
        wait_result(&mut result_rx).await
    }

    /// Finalized result of the current session, if finalize already ran
    pub async fn finalized(&self) -> Option<Arc<FinalizedSession>> {
        let current = self.current.lock().await;
        let handle = current.as_ref()?;
        let result = handle.result_rx.borrow().clone();
        result
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    pub fn capture(&self) -> &Arc<CaptureSessionManager> {
        &self.capture
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    async fn request_finalize(&self, trigger: FinalizeTrigger) -> Option<Arc<FinalizedSession>> {
        let (control_tx, mut result_rx, session_id) = {
            let current = self.current.lock().await;
            let handle = current.as_ref()?;
            (
                handle.control_tx.clone(),
                handle.result_rx.clone(),
                handle.session_id.clone(),
            )
        };

        if result_rx.borrow().is_none() {
            if trigger == FinalizeTrigger::UserStopped {
                self.state_tx.send_replace(CoordinatorState::UserStopped);
            }
            // A closed channel means the driver already finalized
            if control_tx.send(Control::Stop(trigger)).await.is_err() {
                debug!("Session {} driver already finished", session_id);
            }
        }

        wait_result(&mut result_rx).await
    }
}

async fn wait_result(
    result_rx: &mut watch::Receiver<Option<Arc<FinalizedSession>>>,
) -> Option<Arc<FinalizedSession>> {
    let waited = match result_rx.wait_for(Option::is_some).await {
        Ok(result) => Some(result.clone()),
        Err(_) => None,
    };
    // Driver dropped without publishing
    waited.unwrap_or_else(|| result_rx.borrow().clone())
}

struct Driver {
    session_id: String,
    language: String,
    capture: Arc<CaptureSessionManager>,
    recognizer: Arc<Mutex<Box<dyn SpeechRecognizer>>>,
    events: Option<mpsc::Receiver<RecognizerEvent>>,
    control_rx: mpsc::Receiver<Control>,
    debounce: Duration,
    max_duration: Option<Duration>,
    initial_error: Option<VoiceError>,
    result_tx: watch::Sender<Option<Arc<FinalizedSession>>>,
    state_tx: watch::Sender<CoordinatorState>,
}

/// Local transcript accumulated from recognizer events
#[derive(Default)]
struct LocalTranscript {
    finals: Vec<String>,
    confidence_sum: f32,
    last_partial: Option<String>,
}

impl LocalTranscript {
    fn partial(&mut self, text: String) {
        self.last_partial = Some(text);
    }

    fn push_final(&mut self, text: String, confidence: f32) {
        let text = text.trim().to_string();
        if !text.is_empty() {
            self.finals.push(text);
            self.confidence_sum += confidence.clamp(0.0, 1.0);
        }
        self.last_partial = None;
    }

    fn into_result(self, language: &str) -> Option<TranscriptionResult> {
        if !self.finals.is_empty() {
            let confidence = self.confidence_sum / self.finals.len() as f32;
            return Some(TranscriptionResult::new(
                self.finals.join(" "),
                confidence,
                language,
            ));
        }

        // Nothing final; the last hypothesis is still better than nothing
        let partial = self.last_partial?.trim().to_string();
        if partial.is_empty() {
            return None;
        }
        Some(TranscriptionResult::new(partial, 0.0, language))
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<RecognizerEvent>>) -> Option<RecognizerEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn drive_session(mut driver: Driver) {
    let session_id = driver.session_id.clone();

    let mut transcript = LocalTranscript::default();
    let mut recognizer_error = driver.initial_error.take();
    let has_startup_error = recognizer_error.is_some();
    let mut armed: Option<FinalizeTrigger> = None;

    // Disarmed until the recognizer completes
    let debounce = tokio::time::sleep(Duration::from_secs(86_400));
    tokio::pin!(debounce);

    let limit = driver.max_duration;
    let max_duration = async move {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => pending().await,
        }
    };
    tokio::pin!(max_duration);

    let trigger = loop {
        // A recognizer that never started leaves nothing to wait for
        if has_startup_error {
            break FinalizeTrigger::RecognizerError;
        }

        tokio::select! {
            command = driver.control_rx.recv() => match command {
                Some(Control::Stop(trigger)) => {
                    if armed.is_some() {
                        debug!("Explicit stop for {} cancels pending debounce", session_id);
                    }
                    break trigger;
                }
                None => break FinalizeTrigger::Shutdown,
            },

            event = next_event(&mut driver.events) => {
                let completion = match event {
                    Some(RecognizerEvent::Partial(text)) => {
                        transcript.partial(text);
                        None
                    }
                    Some(RecognizerEvent::Final { text, confidence }) => {
                        transcript.push_final(text, confidence);
                        None
                    }
                    Some(RecognizerEvent::Ended) => Some(FinalizeTrigger::RecognizerEnded),
                    Some(RecognizerEvent::Error(kind)) => {
                        warn!("Recognizer error in session {}: {:?}", session_id, kind);
                        if recognizer_error.is_none() {
                            recognizer_error = kind.to_voice_error();
                        }
                        // Errors skip the debounce
                        break FinalizeTrigger::RecognizerError;
                    }
                    None => {
                        driver.events = None;
                        Some(FinalizeTrigger::RecognizerEnded)
                    }
                };

                // First completion signal arms the debounce; later ones are ignored
                if let (Some(trigger), None) = (completion, armed) {
                    debug!("Recognizer completed for {}; finalize in {:?}", session_id, driver.debounce);
                    armed = Some(trigger);
                    driver.state_tx.send_replace(CoordinatorState::RecognizerEnded);
                    debounce.as_mut().reset(tokio::time::Instant::now() + driver.debounce);
                }
            },

            _ = &mut debounce, if armed.is_some() => {
                break armed.unwrap_or(FinalizeTrigger::RecognizerEnded);
            },

            _ = &mut max_duration => {
                info!("Session {} hit the recording limit", session_id);
                break FinalizeTrigger::MaxDuration;
            },
        }
    };

    driver.state_tx.send_replace(CoordinatorState::Finalizing);
    info!("Finalizing voice session {} ({:?})", session_id, trigger);

    {
        let mut recognizer = driver.recognizer.lock().await;
        if let Err(e) = recognizer.stop().await {
            warn!("Recognizer '{}' failed to stop: {}", recognizer.name(), e);
        }
    }

    // Drain whatever the recognizer flushed while stopping
    if let Some(events) = driver.events.as_mut() {
        while let Ok(event) = events.try_recv() {
            match event {
                RecognizerEvent::Partial(text) => transcript.partial(text),
                RecognizerEvent::Final { text, confidence } => {
                    transcript.push_final(text, confidence)
                }
                RecognizerEvent::Ended | RecognizerEvent::Error(_) => {}
            }
        }
    }

    let capture = driver.capture.stop().await;
    if capture.is_none() {
        error!("Capture for session {} was already gone at finalize", session_id);
    }

    let finalized = Arc::new(FinalizedSession {
        session_id: session_id.clone(),
        trigger,
        capture,
        local: transcript.into_result(&driver.language),
        recognizer_error,
    });

    let final_state = match &finalized.recognizer_error {
        Some(_) => CoordinatorState::Errored,
        None => CoordinatorState::Done,
    };

    driver.result_tx.send_replace(Some(finalized));
    driver.state_tx.send_replace(final_state);

    info!("Voice session {} finalized", session_id);
}
