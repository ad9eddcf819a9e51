//! Voice turn orchestration
//!
//! [`VoicePipeline`] wires capture, recognition, transcription hand-off,
//! turn building, the conversation endpoint and reply playback into one
//! component. Every failure below it is turned into a single banner
//! message; only a turn with no transcript at all is abandoned.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::audio::{wav_encoder_factory, AudioBackendFactory, AudioSource};
use crate::config::Config;
use crate::conversation::{
    ConversationRequest, ConversationService, ConversationTurn, ConversationTurnBuilder,
    HttpConversationService, TurnHistory,
};
use crate::error::{Result, VoiceError};
use crate::playback::{
    AudioOutput, HttpSynthesizer, PlaybackManager, PlaybackOutcome, SilentOutput,
    SpeechSynthesizer,
};
use crate::recognition::{CoordinatorState, FinalizedSession, NatsRecognizer, RecognitionCoordinator};
use crate::session::{CaptureSessionManager, SessionState, VoiceSession};
use crate::transcription::{HttpTranscriptionService, TranscriptionHandoff, TranscriptionService};

/// Host capabilities gating voice input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub recognition_available: bool,
    pub microphone_available: bool,
}

impl Capabilities {
    /// Voice input is offered only when both recognition and a microphone exist
    pub fn voice_input_available(&self) -> bool {
        self.recognition_available && self.microphone_available
    }
}

/// Remote collaborators of the pipeline
#[derive(Clone)]
pub struct PipelineServices {
    pub transcription: Arc<dyn TranscriptionService>,
    pub conversation: Arc<dyn ConversationService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub output: Arc<dyn AudioOutput>,
}

/// Result of one completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The user turn exactly as sent
    pub user: ConversationTurn,
    /// Assistant reply, absent when the conversation call failed
    pub reply: Option<ConversationTurn>,
    pub playback: PlaybackOutcome,
    /// Recoverable problems met during the turn
    pub warnings: Vec<VoiceError>,
}

/// Snapshot for status displays
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub state: CoordinatorState,
    pub capture_state: SessionState,
    pub session: Option<VoiceSession>,
    /// Latest normalized level in [0, 1]
    pub level: f32,
    pub banner: Option<String>,
    pub playback_enabled: bool,
    pub voice_input_available: bool,
}

pub struct VoicePipeline {
    capabilities: Capabilities,
    coordinator: Arc<RecognitionCoordinator>,
    handoff: TranscriptionHandoff,
    builder: ConversationTurnBuilder,
    conversation: Arc<dyn ConversationService>,
    playback: PlaybackManager,
    history: Mutex<TurnHistory>,
    banner_tx: watch::Sender<Option<String>>,
}

impl VoicePipeline {
    pub fn new(
        capabilities: Capabilities,
        coordinator: Arc<RecognitionCoordinator>,
        services: PipelineServices,
        playback_enabled: bool,
    ) -> Self {
        let handoff = TranscriptionHandoff::new(services.transcription, coordinator.language());
        let playback =
            PlaybackManager::new(services.synthesizer, services.output, playback_enabled);
        let (banner_tx, _) = watch::channel(None);

        Self {
            capabilities,
            coordinator,
            handoff,
            builder: ConversationTurnBuilder::new(),
            conversation: services.conversation,
            playback,
            history: Mutex::new(TurnHistory::new()),
            banner_tx,
        }
    }

    /// Wire the pipeline from configuration: configured audio source,
    /// NATS recognizer and HTTP endpoints
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let source = AudioSource::parse(&config.audio.source).context("Invalid audio.source")?;
        let is_microphone = source == AudioSource::Microphone;
        let backends = AudioBackendFactory::new(source, config.backend_config());

        let capabilities = Capabilities {
            recognition_available: config.recognition.enabled,
            microphone_available: backends.is_available(),
        };

        let capture = Arc::new(CaptureSessionManager::new(
            Arc::new(backends),
            wav_encoder_factory(),
            config.capture_config(),
        ));
        let coordinator = Arc::new(RecognitionCoordinator::new(
            capture,
            Box::new(NatsRecognizer::new(config.recognition.nats_url.clone())),
            config.recognition_config(),
        ));

        let timeout = config.endpoint_timeout();
        let services = PipelineServices {
            transcription: Arc::new(
                HttpTranscriptionService::new(config.endpoints.transcription.clone(), timeout)
                    .context("Failed to create transcription client")?,
            ),
            conversation: Arc::new(
                HttpConversationService::new(config.endpoints.conversation.clone(), timeout)
                    .context("Failed to create conversation client")?,
            ),
            synthesizer: Arc::new(
                HttpSynthesizer::new(config.endpoints.synthesis.clone(), timeout)
                    .context("Failed to create synthesis client")?,
            ),
            output: default_output(is_microphone),
        };

        info!(
            "Pipeline ready (recognition: {}, microphone: {}, playback: {})",
            capabilities.recognition_available,
            capabilities.microphone_available,
            config.playback.enabled
        );

        Ok(Self::new(
            capabilities,
            coordinator,
            services,
            config.playback.enabled,
        ))
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn coordinator(&self) -> &Arc<RecognitionCoordinator> {
        &self.coordinator
    }

    pub fn playback(&self) -> &PlaybackManager {
        &self.playback
    }

    /// Record one complete voice turn
    ///
    /// Returns `Ok(None)` when a session is already running.
    pub async fn voice_turn(&self) -> Result<Option<TurnOutcome>> {
        if self.start_voice().await?.is_none() {
            return Ok(None);
        }
        self.finish_voice_turn().await.map(Some)
    }

    /// Begin capture and recognition
    ///
    /// Returns `Ok(None)` when a session is already running.
    pub async fn start_voice(&self) -> Result<Option<VoiceSession>> {
        if !self.capabilities.voice_input_available() {
            let error = if self.capabilities.microphone_available {
                VoiceError::RecognitionUnavailable
            } else {
                VoiceError::DeviceUnavailable("no microphone available".to_string())
            };
            self.report(&error);
            return Err(error);
        }

        match self.coordinator.start().await {
            Ok(Some(session)) => {
                self.clear_banner();
                // Reply audio would bleed into the recording
                self.playback.stop().await;
                info!("Voice turn started: {}", session.session_id);
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    /// Ask the current session to finalize now
    pub async fn request_stop(&self) -> Option<Arc<FinalizedSession>> {
        self.coordinator.stop().await
    }

    /// Wait for the running session to finalize, then complete the turn
    pub async fn finish_voice_turn(&self) -> Result<TurnOutcome> {
        let finalized = match self.coordinator.wait_finalized().await {
            Some(finalized) => finalized,
            None => {
                let error = VoiceError::NoUsableTranscript;
                self.report(&error);
                return Err(error);
            }
        };

        let mut warnings = Vec::new();
        if let Some(e) = &finalized.recognizer_error {
            warnings.push(e.clone());
        }

        let (audio, summary) = match &finalized.capture {
            Some(capture) => {
                if let Some(e) = &capture.error {
                    warnings.push(e.clone());
                }
                (capture.take_audio(), Some(capture.summary.clone()))
            }
            None => (None, None),
        };

        let resolved = match self.handoff.resolve(audio, finalized.local.as_ref()).await {
            Ok(resolved) => resolved,
            Err(e) => {
                // Prefer the recognizer's reason over the generic message
                match &finalized.recognizer_error {
                    Some(reason) => self.report(reason),
                    None => self.report(&e),
                }
                warn!("Voice turn {} abandoned: {}", finalized.session_id, e);
                return Err(e);
            }
        };
        warnings.extend(resolved.warnings.iter().cloned());

        let turn = self.builder.build_voice(&resolved, summary.as_ref());
        Ok(self.converse(turn, warnings).await)
    }

    /// Send a typed turn
    pub async fn send_text(&self, text: &str) -> Result<TurnOutcome> {
        if text.trim().is_empty() {
            return Err(VoiceError::NoUsableTranscript);
        }
        self.clear_banner();
        let turn = self.builder.build_text(text);
        Ok(self.converse(turn, Vec::new()).await)
    }

    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.history.lock().await.turns().to_vec()
    }

    /// Current user-visible message, if any
    pub fn banner(&self) -> Option<String> {
        self.banner_tx.borrow().clone()
    }

    pub fn watch_banner(&self) -> watch::Receiver<Option<String>> {
        self.banner_tx.subscribe()
    }

    pub fn clear_banner(&self) {
        self.banner_tx.send_replace(None);
    }

    pub async fn set_playback_enabled(&self, enabled: bool) {
        self.playback.set_enabled(enabled).await;
    }

    pub async fn status(&self) -> PipelineStatus {
        let capture = self.coordinator.capture();
        PipelineStatus {
            state: self.coordinator.state(),
            capture_state: capture.state(),
            session: capture.session().await,
            level: *capture.level().borrow(),
            banner: self.banner(),
            playback_enabled: self.playback.is_enabled(),
            voice_input_available: self.capabilities.voice_input_available(),
        }
    }

    /// Component teardown: finalizes any running session and silences playback
    pub async fn shutdown(&self) {
        if let Some(finalized) = self.coordinator.shutdown().await {
            info!("Session {} finalized on shutdown", finalized.session_id);
        }
        self.playback.stop().await;
    }

    async fn converse(&self, turn: ConversationTurn, mut warnings: Vec<VoiceError>) -> TurnOutcome {
        // History must show exactly what was sent
        let request = {
            let mut history = self.history.lock().await;
            let request = ConversationRequest::new(&turn, history.turns());
            history.push(turn.clone());
            request
        };

        let reply = match self.conversation.send(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warnings.push(e);
                self.report_warnings(&warnings);
                return TurnOutcome {
                    user: turn,
                    reply: None,
                    playback: PlaybackOutcome::Skipped,
                    warnings,
                };
            }
        };

        for warning in reply.warnings() {
            warn!("Conversation service warning: {}", warning);
        }

        let language = reply
            .response
            .language
            .clone()
            .unwrap_or_else(|| self.coordinator.language().to_string());
        let reply_turn = self.builder.build_reply(reply.text(), Some(&language));
        self.history.lock().await.push(reply_turn.clone());

        let playback = self.playback.speak(reply.text(), &language).await;
        if let PlaybackOutcome::Failed(e) = &playback {
            warnings.push(e.clone());
        }

        self.report_warnings(&warnings);
        TurnOutcome {
            user: turn,
            reply: Some(reply_turn),
            playback,
            warnings,
        }
    }

    fn report(&self, error: &VoiceError) {
        self.banner_tx.send_replace(Some(error.user_message()));
    }

    fn report_warnings(&self, warnings: &[VoiceError]) {
        // One banner per turn; the last problem is the one the user noticed
        if let Some(last) = warnings.last() {
            self.report(last);
        }
    }
}

/// Speaker output for live microphone use, silent output otherwise
#[cfg(feature = "device-audio")]
fn default_output(live: bool) -> Arc<dyn AudioOutput> {
    use crate::playback::CpalOutput;

    if live && CpalOutput::is_available() {
        Arc::new(CpalOutput::new())
    } else {
        Arc::new(SilentOutput)
    }
}

#[cfg(not(feature = "device-audio"))]
fn default_output(_live: bool) -> Arc<dyn AudioOutput> {
    Arc::new(SilentOutput)
}
