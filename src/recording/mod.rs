//! Recording sessions driven by meeting transitions.

pub mod controller;
pub mod status;

pub use controller::{
    open_in_file_manager, unique_output_path, CommandError, CommandOutcome, ControllerCommand,
    RecordingController,
};
pub use status::{CompletedRecording, RecordingSession, RecordingSnapshot, RecordingStatusHandle};
