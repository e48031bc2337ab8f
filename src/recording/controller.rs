//! Recording session controller.
//!
//! Single writer of the recording session. Meeting transitions and commands
//! from the control surface are applied one at a time from the app loop;
//! everyone else reads the published [`RecordingSnapshot`].

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::status::{CompletedRecording, RecordingSession, RecordingSnapshot, RecordingStatusHandle};
use crate::audio::{AudioMixerEngine, EngineFailure, RecordingError};
use crate::config::{Codec, RecordingConfig};
use crate::meeting::MeetingTransition;

/// Commands the control surface may issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    /// Start recording now; only legal while a meeting is in progress
    Start,
    Stop,
    SetAutoRecord(bool),
    OpenFolder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Started(PathBuf),
    AlreadyRecording(PathBuf),
    Stopped(Option<CompletedRecording>),
    NotRecording,
    AutoRecord(bool),
    FolderOpened(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("not in a meeting")]
    NotInMeeting,
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error("failed to open {path:?}: {source}")]
    OpenFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type FolderOpener = fn(&Path) -> std::io::Result<()>;

/// Open `path` in the platform file manager.
pub fn open_in_file_manager(path: &Path) -> std::io::Result<()> {
    let program = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    std::process::Command::new(program).arg(path).spawn()?;
    Ok(())
}

/// `<dir>/<prefix> YYYY-MM-DD HH-MM-SS.<ext>`, with ` (n)` appended when taken.
pub fn unique_output_path(
    dir: &Path,
    prefix: &str,
    extension: &str,
    at: DateTime<Local>,
) -> PathBuf {
    let stamp = at.format("%Y-%m-%d %H-%M-%S");
    let path = dir.join(format!("{} {}.{}", prefix, stamp, extension));
    if !path.exists() {
        return path;
    }

    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{} {} ({}).{}", prefix, stamp, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

pub struct RecordingController {
    engine: AudioMixerEngine,
    output_dir: PathBuf,
    file_prefix: String,
    extension: &'static str,
    auto_record: bool,
    session: Option<RecordingSession>,
    last_error: Option<String>,
    last_recording: Option<CompletedRecording>,
    status: watch::Sender<RecordingSnapshot>,
    open_folder: FolderOpener,
}

impl RecordingController {
    pub fn new(engine: AudioMixerEngine, recording: &RecordingConfig, codec: Codec) -> Self {
        let (status, _) = watch::channel(RecordingSnapshot {
            auto_record: recording.record_all_meetings,
            ..Default::default()
        });
        Self {
            engine,
            output_dir: recording.output_dir.clone(),
            file_prefix: recording.file_prefix.clone(),
            extension: codec.extension(),
            auto_record: recording.record_all_meetings,
            session: None,
            last_error: None,
            last_recording: None,
            status,
            open_folder: open_in_file_manager,
        }
    }

    pub fn with_folder_opener(mut self, opener: FolderOpener) -> Self {
        self.open_folder = opener;
        self
    }

    pub fn status_handle(&self) -> RecordingStatusHandle {
        RecordingStatusHandle::new(self.status.subscribe())
    }

    pub fn snapshot(&self) -> RecordingSnapshot {
        RecordingSnapshot {
            session: self.session.clone(),
            auto_record: self.auto_record,
            last_error: self.last_error.clone(),
            last_recording: self.last_recording.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active)
    }

    pub fn on_transition(&mut self, transition: MeetingTransition) {
        match transition {
            MeetingTransition::MeetingStarted => {
                if let Some(session) = &self.session {
                    info!(
                        "Meeting started while already recording to {:?}; ignoring",
                        session.output_path
                    );
                } else if !self.auto_record {
                    info!("Meeting started; automatic recording is off");
                } else {
                    // errors are recorded in the snapshot by start_session
                    let _ = self.start_session();
                }
            }
            MeetingTransition::MeetingEnded => {
                if self.session.is_none() {
                    debug!("Meeting ended with no active recording");
                } else {
                    let _ = self.stop_session();
                }
            }
            MeetingTransition::RemoteRecordingStarted => {
                info!("The meeting itself is now being recorded by the meeting client");
            }
            MeetingTransition::RemoteRecordingStopped => {
                info!("The meeting client stopped its own recording");
            }
        }
    }

    /// Apply a command from the control surface. `in_meeting` is the
    /// tracker's current view.
    pub fn handle_command(
        &mut self,
        command: ControllerCommand,
        in_meeting: bool,
    ) -> Result<CommandOutcome, CommandError> {
        match command {
            ControllerCommand::Start => {
                if let Some(session) = &self.session {
                    return Ok(CommandOutcome::AlreadyRecording(session.output_path.clone()));
                }
                if !in_meeting {
                    return Err(CommandError::NotInMeeting);
                }
                Ok(CommandOutcome::Started(self.start_session()?))
            }
            ControllerCommand::Stop => {
                if self.session.is_none() {
                    return Ok(CommandOutcome::NotRecording);
                }
                Ok(CommandOutcome::Stopped(self.stop_session()?))
            }
            ControllerCommand::SetAutoRecord(enabled) => {
                if self.auto_record != enabled {
                    info!(
                        "Automatic recording {}",
                        if enabled { "enabled" } else { "disabled" }
                    );
                }
                self.auto_record = enabled;
                self.publish();
                Ok(CommandOutcome::AutoRecord(enabled))
            }
            ControllerCommand::OpenFolder => {
                let path = self.output_dir.clone();
                std::fs::create_dir_all(&path)
                    .and_then(|_| (self.open_folder)(&path))
                    .map_err(|source| CommandError::OpenFolder {
                        path: path.clone(),
                        source,
                    })?;
                Ok(CommandOutcome::FolderOpened(path))
            }
        }
    }

    /// The encoder died mid-recording: close out the session, keep tracking.
    pub fn on_engine_failure(&mut self, failure: EngineFailure) {
        let current = self.session.as_ref().map(|s| s.output_path.as_path());
        if current != Some(failure.output_path.as_path()) {
            debug!(
                "Ignoring encoder failure for finished recording {:?}",
                failure.output_path
            );
            return;
        }

        error!(
            "Recording {:?} ended by encoder failure: {}",
            failure.output_path, failure.message
        );
        if let Err(e) = self.engine.stop() {
            debug!("Engine stop after failure: {}", e);
        }
        self.session = None;
        self.last_error = Some(failure.message);
        self.publish();
    }

    /// Finalize any active recording before the process exits.
    pub fn shutdown(&mut self) {
        if self.session.is_some() {
            info!("Finalizing active recording before shutdown");
            let _ = self.stop_session();
        }
    }

    fn start_session(&mut self) -> Result<PathBuf, RecordingError> {
        let started_at = Local::now();
        let path = unique_output_path(
            &self.output_dir,
            &self.file_prefix,
            self.extension,
            started_at,
        );

        let result = match self.engine.start(&path) {
            Ok(()) => {
                info!("Meeting recording started: {:?}", path);
                self.session = Some(RecordingSession {
                    started_at,
                    output_path: path.clone(),
                    is_active: true,
                });
                self.last_error = None;
                Ok(path)
            }
            Err(e) => {
                error!("Recording skipped for this meeting: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        };
        self.publish();
        result
    }

    fn stop_session(&mut self) -> Result<Option<CompletedRecording>, RecordingError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };

        let result = match self.engine.stop() {
            Ok(summary) => {
                let completed = CompletedRecording {
                    bytes_written: summary.map(|s| s.bytes_written).unwrap_or(0),
                    output_path: session.output_path,
                    started_at: session.started_at,
                    finished_at: Local::now(),
                };
                info!(
                    "Meeting recording saved: {:?} ({} bytes)",
                    completed.output_path, completed.bytes_written
                );
                self.last_recording = Some(completed.clone());
                Ok(Some(completed))
            }
            Err(e) => {
                warn!(
                    "Recording {:?} did not finish cleanly: {}",
                    session.output_path, e
                );
                self.last_error = Some(e.to_string());
                Err(e)
            }
        };
        self.publish();
        result
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }
}
