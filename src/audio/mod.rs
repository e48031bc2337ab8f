//! Microphone + system audio capture, mixed into one encoded file.

pub mod audio_mixer;
pub mod audio_source;
pub mod device;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod mic_source;
pub mod resample;
pub mod system_source;

pub use audio_mixer::{mix_clipped, AudioMixer, MixerStats};
pub use audio_source::{
    BlockSink, CaptureBackend, CaptureSource, CapturedBlock, SourceKind, StreamFormat,
};
pub use device::{list_input_devices, CpalBackend, DeviceInfo};
pub use encoder::{create_encoder, AudioEncoder};
pub use engine::{AudioMixerEngine, EngineFailure, RecordingSummary};
pub use error::{DeviceError, EncodeError, RecordingError};
pub use resample::StreamResampler;
