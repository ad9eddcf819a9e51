//! Spoken replies: synthesis, decoding and single-handle playback

mod manager;
mod output;
mod synth;

pub use manager::{PlaybackManager, PlaybackOutcome};
#[cfg(feature = "device-audio")]
pub use output::CpalOutput;
pub use output::{AudioOutput, PlaybackControl, PlaybackHandle, SilentOutput};
pub use synth::{HttpSynthesizer, SpeechSynthesizer, SynthesisRequest, SynthesizedAudio};
