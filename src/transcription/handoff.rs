use std::sync::Arc;

use tracing::{info, warn};

use super::{TranscriptSource, TranscriptionRequest, TranscriptionResult, TranscriptionService};
use crate::audio::EncodedAudio;
use crate::error::{Result, VoiceError};

/// The transcript a voice turn will use
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTranscript {
    pub result: TranscriptionResult,
    pub source: TranscriptSource,
    /// Recoverable problems met on the way (shown as a banner)
    pub warnings: Vec<VoiceError>,
}

impl ResolvedTranscript {
    pub fn text(&self) -> &str {
        &self.result.transcript
    }
}

/// Sends finalized audio to the remote service and reconciles the result
/// with the local recognizer's text
///
/// A successful remote result always wins. On any remote failure the
/// local text is used and a warning recorded. With neither, the turn is
/// abandoned with [`VoiceError::NoUsableTranscript`].
pub struct TranscriptionHandoff {
    service: Arc<dyn TranscriptionService>,
    language: String,
}

impl TranscriptionHandoff {
    pub fn new(service: Arc<dyn TranscriptionService>, language: impl Into<String>) -> Self {
        Self {
            service,
            language: language.into(),
        }
    }

    /// Transcribe `audio`, falling back to `local_hint`
    pub async fn transcribe(&self, audio: EncodedAudio, local_hint: &str) -> Result<ResolvedTranscript> {
        let local = TranscriptionResult::new(local_hint.trim(), 0.0, &self.language);
        self.resolve(Some(audio), Some(&local)).await
    }

    /// Reconcile an optional recording with an optional local result
    ///
    /// Without audio (level-only capture) the remote call is skipped.
    pub async fn resolve(
        &self,
        audio: Option<EncodedAudio>,
        local: Option<&TranscriptionResult>,
    ) -> Result<ResolvedTranscript> {
        let mut warnings = Vec::new();

        match audio {
            Some(audio) if !audio.is_empty() => match self.call_remote(audio).await {
                Ok(remote) => {
                    return Ok(ResolvedTranscript {
                        result: remote,
                        source: TranscriptSource::Remote,
                        warnings,
                    });
                }
                Err(e) => {
                    warn!("Remote transcription failed, falling back to local: {}", e);
                    warnings.push(e);
                }
            },
            _ => info!("No recording to transcribe remotely; using local transcript"),
        }

        match local {
            Some(local) if !local.transcript.trim().is_empty() => Ok(ResolvedTranscript {
                result: TranscriptionResult {
                    transcript: local.transcript.trim().to_string(),
                    ..local.clone()
                },
                source: TranscriptSource::Local,
                warnings,
            }),
            _ => {
                warn!("No usable transcript from either recognizer");
                Err(VoiceError::NoUsableTranscript)
            }
        }
    }

    async fn call_remote(&self, audio: EncodedAudio) -> Result<TranscriptionResult> {
        let request = TranscriptionRequest::from_audio(audio, &self.language);

        let mut result = self
            .service
            .transcribe(request)
            .await
            .map_err(|e| match e {
                VoiceError::TranscriptionUnavailable(_) => e,
                other => VoiceError::TranscriptionUnavailable(other.to_string()),
            })?;

        // An empty transcript carries no information; treat it as malformed
        let transcript = result.transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(VoiceError::TranscriptionUnavailable(
                "remote transcript was empty".to_string(),
            ));
        }

        result.transcript = transcript;
        result.confidence = result.confidence.clamp(0.0, 1.0);
        if result.language_code.is_empty() {
            result.language_code = self.language.clone();
        }

        Ok(result)
    }
}
