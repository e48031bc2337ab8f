use std::path::PathBuf;

use super::audio_source::SourceKind;

/// A capture device is missing, busy, or refuses the stream we asked for.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no {kind} capture device matching '{wanted}'")]
    NotFound { kind: SourceKind, wanted: String },
    #[error("no default input device available")]
    NoDefaultInput,
    #[error("failed to enumerate capture devices: {0}")]
    Enumerate(String),
    #[error("failed to query format of '{device}': {message}")]
    Format { device: String, message: String },
    #[error("'{device}' delivers unsupported sample format {format}")]
    UnsupportedFormat { device: String, format: String },
    #[error("failed to open stream on '{device}': {message}")]
    Stream { device: String, message: String },
    #[error("capture thread for '{0}' exited before the stream started")]
    ThreadGone(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("I/O error on recording file: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV writer error: {0}")]
    Wav(#[from] hound::Error),
    #[error("MP3 encoder error: {0}")]
    Mp3(String),
    #[error("unsupported channel count {0}")]
    Channels(u16),
    #[error("encoder thread stopped unexpectedly")]
    WorkerGone,
}

/// Why a recording could not be started or finished cleanly.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("a recording is already running to {0:?}")]
    AlreadyRunning(PathBuf),
    #[error("encoder did not finish within the shutdown timeout")]
    StopTimeout,
}
