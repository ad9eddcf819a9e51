pub mod backend;
pub mod decode;
pub mod encoder;
pub mod file;
pub mod level;

#[cfg(feature = "device-audio")]
pub mod microphone;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, BackendFactory,
};
pub use decode::{decode_audio, DecodedAudio};
pub use encoder::{wav_encoder_factory, AudioEncoder, EncodedAudio, EncoderFactory, WavEncoder};
pub use file::{AudioFile, FileBackend};
pub use level::{AudioLevelMonitor, LevelCalibration, LevelStats, SILENCE_FLOOR_DB};
