//! Recording status types and the read-only handle given to observers.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// The recording currently owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingSession {
    pub started_at: DateTime<Local>,
    pub output_path: PathBuf,
    pub is_active: bool,
}

impl RecordingSession {
    pub fn duration_seconds(&self) -> u64 {
        (Local::now() - self.started_at).num_seconds().max(0) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedRecording {
    pub output_path: PathBuf,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub bytes_written: u64,
}

/// Consistent view of the controller, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordingSnapshot {
    pub session: Option<RecordingSession>,
    pub auto_record: bool,
    pub last_error: Option<String>,
    pub last_recording: Option<CompletedRecording>,
}

impl RecordingSnapshot {
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.output_path.as_path())
    }
}

/// Cheap cloneable reader; never blocks the controller.
#[derive(Clone)]
pub struct RecordingStatusHandle {
    rx: watch::Receiver<RecordingSnapshot>,
}

impl RecordingStatusHandle {
    pub fn new(rx: watch::Receiver<RecordingSnapshot>) -> Self {
        Self { rx }
    }

    pub fn get(&self) -> RecordingSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<RecordingSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_default_is_idle() {
        let snapshot = RecordingSnapshot::default();
        assert!(!snapshot.is_active());
        assert!(snapshot.output_path().is_none());
    }

    #[tokio::test]
    async fn test_handle_sees_published_changes() {
        let (tx, rx) = watch::channel(RecordingSnapshot::default());
        let mut handle = RecordingStatusHandle::new(rx);

        tx.send_replace(RecordingSnapshot {
            session: Some(RecordingSession {
                started_at: Local::now(),
                output_path: PathBuf::from("/tmp/Recording.mp3"),
                is_active: true,
            }),
            auto_record: true,
            ..Default::default()
        });

        let seen = handle.changed().await.unwrap();
        assert!(seen.is_active());
        assert_eq!(handle.get(), seen);

        drop(tx);
        assert!(handle.changed().await.is_none());
    }

    #[test]
    fn test_snapshot_serializes_session() {
        let snapshot = RecordingSnapshot {
            session: Some(RecordingSession {
                started_at: Local::now(),
                output_path: PathBuf::from("/tmp/a.mp3"),
                is_active: true,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["session"]["output_path"], "/tmp/a.mp3");
        assert_eq!(json["auto_record"], false);
    }
}
