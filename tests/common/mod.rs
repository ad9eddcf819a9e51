// Test doubles shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use voice_pipeline::audio::encoder::write_wav;
use voice_pipeline::audio::{
    wav_encoder_factory, AudioBackend, AudioEncoder, AudioFrame, BackendFactory, DecodedAudio,
    EncodedAudio, EncoderFactory,
};
use voice_pipeline::conversation::{
    ConversationReply, ConversationRequest, ConversationService, ReplyBody,
};
use voice_pipeline::error::{Result, VoiceError};
use voice_pipeline::playback::{
    AudioOutput, PlaybackControl, SpeechSynthesizer, SynthesisRequest, SynthesizedAudio,
};
use voice_pipeline::recognition::{
    RecognitionConfig, RecognitionCoordinator, RecognizerEvent, SpeechRecognizer,
};
use voice_pipeline::session::{CaptureConfig, CaptureSessionManager};
use voice_pipeline::transcription::{
    TranscriptionRequest, TranscriptionResult, TranscriptionService,
};
use voice_pipeline::{Capabilities, PipelineServices, VoicePipeline};

pub const SAMPLE_RATE: u32 = 16000;

/// `count` frames of 100ms square wave at `amplitude`
pub fn square_frames(count: usize, amplitude: i16) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| AudioFrame {
            samples: (0..1600)
                .map(|n| if (n / 20) % 2 == 0 { amplitude } else { -amplitude })
                .collect(),
            sample_rate: SAMPLE_RATE,
            channels: 1,
            timestamp_ms: i as u64 * 100,
        })
        .collect()
}

/// In-memory WAV of a short tone
pub fn tone_wav(duration_ms: u64) -> Vec<u8> {
    let count = (SAMPLE_RATE as u64 * duration_ms / 1000) as usize;
    let samples: Vec<i16> = (0..count)
        .map(|n| ((n as f32 * 0.05).sin() * 8000.0) as i16)
        .collect();
    write_wav(&samples, SAMPLE_RATE, 1).unwrap()
}

pub fn encoded_audio() -> EncodedAudio {
    EncodedAudio {
        bytes: tone_wav(200),
        mime_type: "audio/wav".to_string(),
        sample_rate: SAMPLE_RATE,
        channels: 1,
        duration_ms: 200,
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Device bookkeeping shared by every backend a factory creates
#[derive(Default)]
pub struct DeviceCounters {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl DeviceCounters {
    /// Devices acquired and not yet released
    pub fn held(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

/// Emits a fixed set of frames, then keeps the input open until stopped
/// (or closes it, when built with `ScriptedFactory::closing`)
pub struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    counters: Arc<DeviceCounters>,
    fail_start: Option<VoiceError>,
    close_input: bool,
    release_delay: Duration,
    sender: Option<mpsc::Sender<AudioFrame>>,
    started: bool,
}

#[async_trait::async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if let Some(e) = self.fail_start.take() {
            return Err(e);
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(self.frames.len() + 1);
        for frame in self.frames.drain(..) {
            tx.try_send(frame).unwrap();
        }
        if !self.close_input {
            self.sender = Some(tx);
        }
        self.started = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if std::mem::take(&mut self.started) {
            self.sender = None;
            if !self.release_delay.is_zero() {
                tokio::time::sleep(self.release_delay).await;
            }
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.started
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedFactory {
    frames: Vec<AudioFrame>,
    pub counters: Arc<DeviceCounters>,
    fail_next: Mutex<Option<VoiceError>>,
    close_input: bool,
    release_delay: Duration,
}

impl ScriptedFactory {
    pub fn new(frames: Vec<AudioFrame>) -> Arc<Self> {
        Arc::new(Self::build(frames, false, Duration::ZERO))
    }

    /// Input ends by itself once the frames are delivered
    pub fn closing(frames: Vec<AudioFrame>) -> Arc<Self> {
        Arc::new(Self::build(frames, true, Duration::ZERO))
    }

    /// Releasing the device takes `delay`
    pub fn slow_release(frames: Vec<AudioFrame>, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(frames, false, delay))
    }

    fn build(frames: Vec<AudioFrame>, close_input: bool, release_delay: Duration) -> Self {
        Self {
            frames,
            counters: Arc::new(DeviceCounters::default()),
            fail_next: Mutex::new(None),
            close_input,
            release_delay,
        }
    }

    /// Make the next acquisition fail with `error`
    pub fn fail_next(&self, error: VoiceError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn AudioBackend>> {
        Ok(Box::new(ScriptedBackend {
            frames: self.frames.clone(),
            counters: Arc::clone(&self.counters),
            fail_start: self.fail_next.lock().unwrap().take(),
            close_input: self.close_input,
            release_delay: self.release_delay,
            sender: None,
            started: false,
        }))
    }
}

/// Encoder that breaks on the first frame
pub struct FailingEncoder;

#[async_trait::async_trait]
impl AudioEncoder for FailingEncoder {
    fn encode(&mut self, _frame: &AudioFrame) -> Result<()> {
        Err(VoiceError::EncoderFailure("disk full".to_string()))
    }

    async fn finish(self: Box<Self>) -> Result<Option<EncodedAudio>> {
        Ok(None)
    }
}

pub fn failing_encoder_factory() -> EncoderFactory {
    Arc::new(|| Box::new(FailingEncoder) as Box<dyn AudioEncoder>)
}

pub fn capture_manager(factory: Arc<ScriptedFactory>, config: CaptureConfig) -> Arc<CaptureSessionManager> {
    Arc::new(CaptureSessionManager::new(factory, wav_encoder_factory(), config))
}

// ============================================================================
// Recognition
// ============================================================================

#[derive(Default)]
pub struct RecognizerCounters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

/// Plays back a script of `(delay, event)` pairs, then stays silent
pub struct ScriptedRecognizer {
    script: Vec<(Duration, RecognizerEvent)>,
    fail_start: Option<VoiceError>,
    pub counters: Arc<RecognizerCounters>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<(Duration, RecognizerEvent)>) -> Self {
        Self {
            script,
            fail_start: None,
            counters: Arc::new(RecognizerCounters::default()),
            task: None,
        }
    }

    /// Recognizer that never reports anything
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing(error: VoiceError) -> Self {
        Self {
            fail_start: Some(error),
            ..Self::silent()
        }
    }

    /// Final transcript followed by end-of-utterance
    pub fn saying(text: &str) -> Self {
        Self::new(vec![
            (
                Duration::ZERO,
                RecognizerEvent::Final {
                    text: text.to_string(),
                    confidence: 0.8,
                },
            ),
            (Duration::ZERO, RecognizerEvent::Ended),
        ])
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn start(
        &mut self,
        _session_id: &str,
        _frames: broadcast::Receiver<AudioFrame>,
        _language: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fail_start.clone() {
            return Err(e);
        }

        let (tx, rx) = mpsc::channel(16);
        let script = self.script.clone();
        self.task = Some(tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep(delay).await;
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            // Keep the channel open like a live recognizer
            std::future::pending::<()>().await;
        }));
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn coordinator(
    factory: Arc<ScriptedFactory>,
    recognizer: ScriptedRecognizer,
    debounce: Duration,
) -> RecognitionCoordinator {
    RecognitionCoordinator::new(
        capture_manager(factory, CaptureConfig::default()),
        Box::new(recognizer),
        RecognitionConfig {
            debounce,
            ..RecognitionConfig::default()
        },
    )
}

// ============================================================================
// Remote services
// ============================================================================

/// Transcription service returning a canned result (or failing)
pub struct MockTranscription {
    result: Option<TranscriptionResult>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<TranscriptionRequest>>,
}

impl MockTranscription {
    pub fn returning(text: &str, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            result: Some(TranscriptionResult::new(text, confidence, "en-US")),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }
}

#[async_trait::async_trait]
impl TranscriptionService for MockTranscription {
    async fn transcribe(&self, request: TranscriptionRequest) -> Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        self.result
            .clone()
            .ok_or_else(|| VoiceError::NetworkFailure("connection refused".to_string()))
    }
}

/// Conversation service echoing the message back
#[derive(Default)]
pub struct MockConversation {
    fail: AtomicBool,
    pub requests: Mutex<Vec<serde_json::Value>>,
}

impl MockConversation {
    pub fn echo() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let mock = Self::default();
        mock.fail.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ConversationService for MockConversation {
    async fn send(&self, request: ConversationRequest) -> Result<ConversationReply> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(&request).unwrap());

        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::NetworkFailure("503 from upstream".to_string()));
        }

        Ok(ConversationReply {
            response: ReplyBody {
                text: format!("You said: {}", request.message),
                language: Some("en-US".to_string()),
            },
            emotion: None,
            meta: None,
        })
    }
}

/// Synthesizer producing a short WAV tone
pub struct MockSynthesizer {
    delay: Duration,
    fail: bool,
    garbage: bool,
    pub calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn tone() -> Arc<Self> {
        Self::with(Duration::ZERO, false, false)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::with(delay, false, false)
    }

    pub fn failing() -> Arc<Self> {
        Self::with(Duration::ZERO, true, false)
    }

    /// Returns bytes that are not audio
    pub fn garbage() -> Arc<Self> {
        Self::with(Duration::ZERO, false, true)
    }

    fn with(delay: Duration, fail: bool, garbage: bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail,
            garbage,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _request: SynthesisRequest) -> Result<SynthesizedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if self.fail {
            return Err(VoiceError::NetworkFailure("synthesis timed out".to_string()));
        }
        let bytes = if self.garbage {
            b"definitely not audio".to_vec()
        } else {
            tone_wav(2000)
        };
        Ok(SynthesizedAudio {
            bytes,
            mime_type: "audio/wav".to_string(),
        })
    }
}

/// Output that records whether two playbacks were ever audible at once
///
/// A playback counts as audible until it calls `finish()`, not merely
/// until a stop was requested.
#[derive(Default)]
pub struct TrackingOutput {
    playing: Mutex<Vec<(PlaybackControl, Arc<AtomicBool>)>>,
    /// Time a stopped playback keeps sounding, like a device draining its buffer
    release_delay: Duration,
    pub plays: AtomicUsize,
    pub overlaps: AtomicUsize,
}

impl TrackingOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn draining(release_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            release_delay,
            ..Self::default()
        })
    }

    /// Controls of every playback started so far
    pub fn controls(&self) -> Vec<PlaybackControl> {
        self.playing
            .lock()
            .unwrap()
            .iter()
            .map(|(control, _)| control.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl AudioOutput for TrackingOutput {
    async fn play(&self, audio: DecodedAudio, control: PlaybackControl) -> Result<()> {
        let done = Arc::new(AtomicBool::new(false));
        {
            let mut playing = self.playing.lock().unwrap();
            let audible = playing
                .iter()
                .filter(|(_, done)| !done.load(Ordering::SeqCst))
                .count();
            if audible > 0 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            playing.push((control.clone(), Arc::clone(&done)));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);

        let mut control = control;
        let duration = Duration::from_millis(audio.duration_ms());
        let release_delay = self.release_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = control.stopped() => tokio::time::sleep(release_delay).await,
            }
            done.store(true, Ordering::SeqCst);
            control.finish();
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "tracking"
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Harness {
    pub pipeline: Arc<VoicePipeline>,
    pub devices: Arc<DeviceCounters>,
    pub transcription: Arc<MockTranscription>,
    pub conversation: Arc<MockConversation>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub output: Arc<TrackingOutput>,
}

pub fn harness(
    recognizer: ScriptedRecognizer,
    transcription: Arc<MockTranscription>,
    conversation: Arc<MockConversation>,
) -> Harness {
    let capabilities = Capabilities {
        recognition_available: true,
        microphone_available: true,
    };
    harness_with(capabilities, recognizer, transcription, conversation)
}

pub fn harness_with(
    capabilities: Capabilities,
    recognizer: ScriptedRecognizer,
    transcription: Arc<MockTranscription>,
    conversation: Arc<MockConversation>,
) -> Harness {
    let factory = ScriptedFactory::new(square_frames(5, 8000));
    let devices = Arc::clone(&factory.counters);
    let synthesizer = MockSynthesizer::tone();
    let output = TrackingOutput::new();

    let coordinator = Arc::new(coordinator(factory, recognizer, Duration::from_millis(50)));
    let services = PipelineServices {
        transcription: transcription.clone(),
        conversation: conversation.clone(),
        synthesizer: synthesizer.clone(),
        output: output.clone(),
    };

    Harness {
        pipeline: Arc::new(VoicePipeline::new(capabilities, coordinator, services, true)),
        devices,
        transcription,
        conversation,
        synthesizer,
        output,
    }
}

/// Serve `app` on an ephemeral local port, returning its base URL
pub async fn spawn_server(app: axum::Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(format!("http://{}", addr))
}
