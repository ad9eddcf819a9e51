use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::output::{AudioOutput, PlaybackHandle};
use super::synth::{SpeechSynthesizer, SynthesisRequest};
use crate::audio::decode_audio;
use crate::error::VoiceError;

/// How long a stopped output may take to go silent before the next reply starts
const STOP_GRACE: Duration = Duration::from_millis(500);

/// What happened to a reply handed to [`PlaybackManager::speak`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    /// Playback disabled or nothing to say
    Skipped,
    /// A newer reply (or a stop) arrived while this one was being prepared
    Superseded,
    /// Now playing under this generation
    Playing(u64),
    /// Synthesis, decoding or output failed; the reply text is unaffected
    Failed(VoiceError),
}

/// Speaks assistant replies, one at a time
///
/// Starting a new reply stops the previous one first. Every reply gets a
/// generation number; a synthesis that completes after a newer reply was
/// requested is discarded instead of played.
pub struct PlaybackManager {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    enabled: AtomicBool,
    generation: AtomicU64,
    current: Mutex<Option<PlaybackHandle>>,
}

impl PlaybackManager {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        enabled: bool,
    ) -> Self {
        Self {
            synthesizer,
            output,
            enabled: AtomicBool::new(enabled),
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Toggle playback; disabling also stops whatever is playing
    pub async fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.stop().await;
        }
    }

    /// Synthesize and play `text`
    pub async fn speak(&self, text: &str, language: &str) -> PlaybackOutcome {
        if !self.is_enabled() || text.trim().is_empty() {
            return PlaybackOutcome::Skipped;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_current().await;

        let request = SynthesisRequest {
            text: text.trim().to_string(),
            language: language.to_string(),
        };

        let synthesized = match self.synthesizer.synthesize(request).await {
            Ok(audio) => audio,
            Err(e) => return self.failed(e),
        };

        if self.is_stale(generation) {
            debug!("Discarding synthesis for superseded reply {}", generation);
            return PlaybackOutcome::Superseded;
        }

        let mime_type = synthesized.mime_type;
        let bytes = synthesized.bytes;
        let decoded = match tokio::task::spawn_blocking(move || decode_audio(bytes, &mime_type)).await
        {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(e)) => return self.failed(e),
            Err(e) => return self.failed(VoiceError::Decode(e.to_string())),
        };

        let mut current = self.current.lock().await;
        if self.is_stale(generation) || !self.is_enabled() {
            return PlaybackOutcome::Superseded;
        }
        // The previous reply must be silent before the next one starts
        if let Some(previous) = current.take() {
            release(previous).await;
        }

        let (handle, control) = PlaybackHandle::new(generation);
        if let Err(e) = self.output.play(decoded, control).await {
            return self.failed(e);
        }

        info!("Playing reply {} via {}", generation, self.output.name());
        *current = Some(handle);
        PlaybackOutcome::Playing(generation)
    }

    /// Stop playback and discard any synthesis in flight
    pub async fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_current().await;
    }

    /// True while a reply is audible
    pub async fn is_playing(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait until the current reply (if any) has finished
    pub async fn wait_idle(&self) {
        let finished = self.current.lock().await.as_ref().map(PlaybackHandle::finished);
        if let Some(mut finished) = finished {
            let _ = finished.wait_for(|done| *done).await;
        }
    }

    async fn stop_current(&self) {
        let mut current = self.current.lock().await;
        if let Some(handle) = current.take() {
            release(handle).await;
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn failed(&self, error: VoiceError) -> PlaybackOutcome {
        let error = match error {
            VoiceError::SynthesisOrPlaybackFailure(_) => error,
            other => VoiceError::SynthesisOrPlaybackFailure(other.to_string()),
        };
        warn!("Reply playback failed: {}", error);
        PlaybackOutcome::Failed(error)
    }
}

async fn release(handle: PlaybackHandle) {
    debug!("Stopping reply {}", handle.generation());
    if !handle.stop_and_wait(STOP_GRACE).await {
        warn!(
            "Reply {} did not go silent within {:?}",
            handle.generation(),
            STOP_GRACE
        );
    }
}
