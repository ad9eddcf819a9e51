// Streaming recognizer backed by the local STT service over NATS
//
// Frames from the capture tap are published as base64 PCM on
// `audio.frame.<session>`; partial and final transcripts come back on
// `stt.text.>`. A final transcript marks the end of the utterance.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{RecognizerErrorKind, RecognizerEvent, SpeechRecognizer};
use crate::audio::AudioFrame;
use crate::error::Result;
use crate::nats::{NatsClient, RecognizerErrorMessage, TranscriptMessage};

/// How long `stop()` waits for the final frame marker to go out
const FINAL_MARKER_TIMEOUT: Duration = Duration::from_secs(1);

pub struct NatsRecognizer {
    url: String,
    stop_tx: Option<watch::Sender<bool>>,
    publisher: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl NatsRecognizer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stop_tx: None,
            publisher: None,
            listener: None,
        }
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for NatsRecognizer {
    async fn start(
        &mut self,
        session_id: &str,
        frames: broadcast::Receiver<AudioFrame>,
        language: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>> {
        // A previous session may not have been stopped explicitly
        self.stop().await?;

        let client = Arc::new(NatsClient::connect(&self.url, session_id.to_string()).await?);
        let transcripts = client.subscribe_transcripts().await?;
        let errors = client.subscribe_errors().await?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);

        self.publisher = Some(tokio::spawn(publish_frames(
            Arc::clone(&client),
            frames,
            stop_rx,
            language.to_string(),
        )));
        self.listener = Some(tokio::spawn(listen(
            session_id.to_string(),
            transcripts,
            errors,
            events_tx,
        )));
        self.stop_tx = Some(stop_tx);

        info!("NATS recognizer streaming session {}", session_id);
        Ok(events_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            stop_tx.send_replace(true);
        }

        if let Some(publisher) = self.publisher.take() {
            match tokio::time::timeout(FINAL_MARKER_TIMEOUT, publisher).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Frame publisher failed: {}", e),
                Err(_) => warn!("Frame publisher did not finish in time"),
            }
        }

        if let Some(listener) = self.listener.take() {
            listener.abort();
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "NATS streaming STT"
    }
}

async fn publish_frames(
    client: Arc<NatsClient>,
    mut frames: broadcast::Receiver<AudioFrame>,
    mut stop_rx: watch::Receiver<bool>,
    language: String,
) {
    let mut sequence: u32 = 0;
    let mut format = (16000u32, 1u16);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    format = (frame.sample_rate, frame.channels);
                    let pcm_bytes: Vec<u8> = frame.samples.iter().flat_map(|s| s.to_le_bytes()).collect();

                    if let Err(e) = client
                        .publish_audio_frame(&pcm_bytes, frame.sample_rate, frame.channels, sequence, &language, false)
                        .await
                    {
                        warn!("Failed to publish audio frame: {}", e);
                    }
                    sequence = sequence.wrapping_add(1);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Recognizer fell behind; skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // Final marker tells the STT service to flush its hypothesis
    if let Err(e) = client
        .publish_audio_frame(&[], format.0, format.1, sequence, &language, true)
        .await
    {
        warn!("Failed to send final frame marker: {}", e);
    }
    if let Err(e) = client.flush().await {
        debug!("NATS flush failed: {}", e);
    }
}

async fn listen(
    session_id: String,
    mut transcripts: async_nats::Subscriber,
    mut errors: async_nats::Subscriber,
    events_tx: mpsc::Sender<RecognizerEvent>,
) {
    loop {
        let event = tokio::select! {
            msg = transcripts.next() => match msg {
                Some(msg) => match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) if transcript.session_id == session_id => {
                        if transcript.partial {
                            RecognizerEvent::Partial(transcript.text)
                        } else {
                            RecognizerEvent::Final {
                                text: transcript.text,
                                confidence: transcript.confidence,
                            }
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                },
                None => RecognizerEvent::Error(RecognizerErrorKind::Network),
            },
            msg = errors.next() => match msg {
                Some(msg) => match serde_json::from_slice::<RecognizerErrorMessage>(&msg.payload) {
                    Ok(report) if report.session_id == session_id => {
                        RecognizerEvent::Error(parse_error_kind(&report.error))
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Failed to parse recognizer error: {}", e);
                        continue;
                    }
                },
                None => RecognizerEvent::Error(RecognizerErrorKind::Network),
            },
        };

        let ends_utterance = matches!(
            event,
            RecognizerEvent::Final { .. } | RecognizerEvent::Error(_)
        );

        if events_tx.send(event).await.is_err() {
            break;
        }

        if ends_utterance {
            let _ = events_tx.send(RecognizerEvent::Ended).await;
            break;
        }
    }

    debug!("Transcript listener for {} stopped", session_id);
}

/// Map the STT service's error codes onto recognizer error kinds
pub fn parse_error_kind(code: &str) -> RecognizerErrorKind {
    match code {
        "network" => RecognizerErrorKind::Network,
        "not-allowed" | "service-not-allowed" => RecognizerErrorKind::NotAllowed,
        "no-speech" => RecognizerErrorKind::NoSpeech,
        "aborted" => RecognizerErrorKind::Aborted,
        _ => RecognizerErrorKind::Other,
    }
}
