//! Edge-triggered meeting lifecycle detection.
//!
//! Only a flip of `isInMeeting` that we actually observed produces a
//! transition. The value seen in the first frame after startup is taken as
//! the baseline, so a meeting that was already running when the process
//! started is never recorded automatically.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use super::state::{MeetingPermissions, MeetingState};
use crate::protocol::{InboundMessage, MeetingUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingTransition {
    MeetingStarted,
    MeetingEnded,
    /// The meeting's own recording was switched on by a participant.
    RemoteRecordingStarted,
    RemoteRecordingStopped,
}

/// What the control surface sees of the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSnapshot {
    pub meeting_state: MeetingState,
    pub meeting_permissions: MeetingPermissions,
    /// False until a frame has carried `isInMeeting`
    pub in_meeting_known: bool,
}

pub struct MeetingStateTracker {
    state: MeetingState,
    permissions: MeetingPermissions,
    in_meeting_known: bool,
    recording_known: bool,
    snapshot: watch::Sender<MeetingSnapshot>,
}

impl Default for MeetingStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MeetingStateTracker {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(MeetingSnapshot::default());
        Self {
            state: MeetingState::default(),
            permissions: MeetingPermissions::default(),
            in_meeting_known: false,
            recording_known: false,
            snapshot,
        }
    }

    pub fn state(&self) -> &MeetingState {
        &self.state
    }

    pub fn permissions(&self) -> &MeetingPermissions {
        &self.permissions
    }

    /// True only when a frame has told us we are in a meeting.
    pub fn is_in_meeting(&self) -> bool {
        self.in_meeting_known && self.state.is_in_meeting
    }

    pub fn subscribe(&self) -> watch::Receiver<MeetingSnapshot> {
        self.snapshot.subscribe()
    }

    /// Feed one decoded frame. Non-update frames are ignored.
    pub fn on_message(&mut self, message: &InboundMessage) -> Option<MeetingTransition> {
        match message {
            InboundMessage::MeetingUpdate(update) => self.apply_update(update),
            _ => None,
        }
    }

    fn apply_update(&mut self, update: &MeetingUpdate) -> Option<MeetingTransition> {
        let previous = self.state;
        let had_in_meeting = self.in_meeting_known;
        let had_recording = self.recording_known;

        if let Some(patch) = &update.meeting_state {
            self.state.merge(patch);
            self.in_meeting_known |= patch.is_in_meeting.is_some();
            self.recording_known |= patch.is_recording_on.is_some();
        }
        if let Some(permissions) = &update.meeting_permissions {
            self.permissions.merge(permissions);
        }

        for (flag, value) in self.state.changes_since(&previous) {
            debug!("Meeting flag {} is now {}", flag, value);
        }

        self.snapshot.send_replace(MeetingSnapshot {
            meeting_state: self.state,
            meeting_permissions: self.permissions.clone(),
            in_meeting_known: self.in_meeting_known,
        });

        if !had_in_meeting {
            if self.in_meeting_known && self.state.is_in_meeting {
                info!("Meeting already in progress at startup; waiting for the next meeting to record");
            }
        } else if previous.is_in_meeting != self.state.is_in_meeting {
            return Some(if self.state.is_in_meeting {
                info!("Meeting started");
                MeetingTransition::MeetingStarted
            } else {
                info!("Meeting ended");
                MeetingTransition::MeetingEnded
            });
        }

        if had_recording && previous.is_recording_on != self.state.is_recording_on {
            return Some(if self.state.is_recording_on {
                info!("Meeting client reports the meeting is being recorded");
                MeetingTransition::RemoteRecordingStarted
            } else {
                info!("Meeting client reports the meeting recording stopped");
                MeetingTransition::RemoteRecordingStopped
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec;

    fn frame(json: &str) -> InboundMessage {
        codec::decode(json).unwrap()
    }

    fn in_meeting(value: bool) -> InboundMessage {
        frame(&format!(
            r#"{{"meetingUpdate":{{"meetingState":{{"isInMeeting":{value}}}}}}}"#
        ))
    }

    #[test]
    fn test_initial_in_meeting_emits_nothing() {
        let mut tracker = MeetingStateTracker::new();
        assert_eq!(tracker.on_message(&in_meeting(true)), None);
        assert!(tracker.is_in_meeting());

        // leaving the pre-existing meeting is still a real flip
        assert_eq!(
            tracker.on_message(&in_meeting(false)),
            Some(MeetingTransition::MeetingEnded)
        );
    }

    #[test]
    fn test_flip_emits_exactly_once() {
        let mut tracker = MeetingStateTracker::new();
        assert_eq!(tracker.on_message(&in_meeting(false)), None);
        assert_eq!(
            tracker.on_message(&in_meeting(true)),
            Some(MeetingTransition::MeetingStarted)
        );
        assert_eq!(tracker.on_message(&in_meeting(true)), None);
        assert_eq!(tracker.on_message(&in_meeting(true)), None);
        assert_eq!(
            tracker.on_message(&in_meeting(false)),
            Some(MeetingTransition::MeetingEnded)
        );
        assert_eq!(tracker.on_message(&in_meeting(false)), None);
    }

    #[test]
    fn test_frames_without_in_meeting_do_not_set_baseline() {
        let mut tracker = MeetingStateTracker::new();
        let muted = frame(r#"{"meetingUpdate":{"meetingState":{"isMuted":true}}}"#);
        assert_eq!(tracker.on_message(&muted), None);
        assert!(!tracker.is_in_meeting());

        // first frame that carries the field is still only the baseline
        assert_eq!(tracker.on_message(&in_meeting(true)), None);
    }

    #[test]
    fn test_absent_fields_are_not_reverted() {
        let mut tracker = MeetingStateTracker::new();
        tracker.on_message(&frame(
            r#"{"meetingUpdate":{"meetingState":{"isInMeeting":false,"isMuted":true,"isSharing":true}}}"#,
        ));
        tracker.on_message(&frame(
            r#"{"meetingUpdate":{"meetingState":{"isSharing":false}}}"#,
        ));
        tracker.on_message(&frame(r#"{"meetingUpdate":{"meetingPermissions":{"canToggleMute":true}}}"#));

        let state = tracker.state();
        assert!(state.is_muted);
        assert!(!state.is_sharing);
        assert!(tracker.permissions().allows("canToggleMute"));
    }

    #[test]
    fn test_remote_recording_flip() {
        let mut tracker = MeetingStateTracker::new();
        tracker.on_message(&frame(
            r#"{"meetingUpdate":{"meetingState":{"isInMeeting":true,"isRecordingOn":false}}}"#,
        ));
        assert_eq!(
            tracker.on_message(&frame(
                r#"{"meetingUpdate":{"meetingState":{"isRecordingOn":true}}}"#
            )),
            Some(MeetingTransition::RemoteRecordingStarted)
        );
    }

    #[test]
    fn test_meeting_flip_wins_over_recording_flip() {
        let mut tracker = MeetingStateTracker::new();
        tracker.on_message(&frame(
            r#"{"meetingUpdate":{"meetingState":{"isInMeeting":false,"isRecordingOn":false}}}"#,
        ));
        assert_eq!(
            tracker.on_message(&frame(
                r#"{"meetingUpdate":{"meetingState":{"isInMeeting":true,"isRecordingOn":true}}}"#
            )),
            Some(MeetingTransition::MeetingStarted)
        );
    }

    #[test]
    fn test_other_messages_are_ignored() {
        let mut tracker = MeetingStateTracker::new();
        assert_eq!(
            tracker.on_message(&frame(r#"{"tokenRefresh":"abc"}"#)),
            None
        );
        assert_eq!(
            tracker.on_message(&frame(r#"{"requestId":1,"response":"Success"}"#)),
            None
        );
    }

    #[test]
    fn test_snapshot_follows_updates() {
        let mut tracker = MeetingStateTracker::new();
        let snapshot = tracker.subscribe();
        tracker.on_message(&frame(
            r#"{"meetingUpdate":{"meetingState":{"isInMeeting":true,"isMuted":true}}}"#,
        ));

        let current = snapshot.borrow().clone();
        assert!(current.in_meeting_known);
        assert!(current.meeting_state.is_in_meeting);
        assert!(current.meeting_state.is_muted);
    }
}
