//! API route modules.

pub mod meeting;
pub mod recording;

use tokio::sync::{mpsc, oneshot, watch};

use crate::meeting::MeetingSnapshot;
use crate::protocol::ClientHandle;
use crate::recording::{CommandError, CommandOutcome, ControllerCommand, RecordingStatusHandle};

/// A controller command plus the channel its outcome is returned on.
pub struct ApiCommand {
    pub command: ControllerCommand,
    pub reply: oneshot::Sender<Result<CommandOutcome, CommandError>>,
}

/// Shared state for every route.
#[derive(Clone)]
pub struct ApiState {
    pub tx: mpsc::Sender<ApiCommand>,
    pub recording: RecordingStatusHandle,
    pub meeting: watch::Receiver<MeetingSnapshot>,
    pub client: ClientHandle,
}
