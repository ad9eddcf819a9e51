use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;

use super::backend::AudioFrame;
use crate::error::{Result, VoiceError};

/// Recorded audio ready for hand-off
///
/// Single consumer: whoever takes it owns the bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
}

impl EncodedAudio {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodes captured frames into a transportable container
#[async_trait::async_trait]
pub trait AudioEncoder: Send {
    /// Append one captured frame
    fn encode(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Flush buffered audio and emit the encoded bytes
    ///
    /// Returns `None` when nothing was captured.
    async fn finish(self: Box<Self>) -> Result<Option<EncodedAudio>>;
}

/// Builds one encoder per capture session
pub type EncoderFactory = Arc<dyn Fn() -> Box<dyn AudioEncoder> + Send + Sync>;

/// Factory for the default WAV encoder
pub fn wav_encoder_factory() -> EncoderFactory {
    Arc::new(|| Box::new(WavEncoder::new()) as Box<dyn AudioEncoder>)
}

/// 16-bit PCM WAV encoder writing to memory
pub struct WavEncoder {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl WavEncoder {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
        }
    }
}

impl Default for WavEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AudioEncoder for WavEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.sample_rate == 0 {
            self.sample_rate = frame.sample_rate;
            self.channels = frame.channels;
        } else if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
            return Err(VoiceError::EncoderFailure(format!(
                "format changed mid-session: {}Hz/{}ch -> {}Hz/{}ch",
                self.sample_rate, self.channels, frame.sample_rate, frame.channels
            )));
        }

        self.samples.extend_from_slice(&frame.samples);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<Option<EncodedAudio>> {
        if self.samples.is_empty() {
            return Ok(None);
        }

        let WavEncoder {
            samples,
            sample_rate,
            channels,
        } = *self;

        let duration_ms = pcm_duration_ms(samples.len(), sample_rate, channels);

        let bytes = tokio::task::spawn_blocking(move || write_wav(&samples, sample_rate, channels))
            .await
            .map_err(|e| VoiceError::EncoderFailure(format!("encoder task failed: {}", e)))??;

        debug!("WAV encoder flushed {} bytes ({}ms)", bytes.len(), duration_ms);

        Ok(Some(EncodedAudio {
            bytes,
            mime_type: "audio/wav".to_string(),
            sample_rate,
            channels,
            duration_ms,
        }))
    }
}

/// Write interleaved 16-bit PCM into an in-memory WAV container
pub fn write_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

fn pcm_duration_ms(sample_count: usize, sample_rate: u32, channels: u16) -> u64 {
    if sample_rate == 0 || channels == 0 {
        return 0;
    }
    (sample_count as u64 / channels as u64) * 1000 / sample_rate as u64
}
