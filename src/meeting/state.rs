//! Last-known meeting state, merged field by field from update frames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::protocol::MeetingStatePatch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingState {
    pub is_muted: bool,
    pub is_video_on: bool,
    pub is_hand_raised: bool,
    pub is_in_meeting: bool,
    pub is_recording_on: bool,
    pub is_background_blurred: bool,
    pub is_sharing: bool,
    pub has_unread_messages: bool,
}

impl MeetingState {
    /// Overwrite the fields present in `patch`; absent fields keep their value.
    pub fn merge(&mut self, patch: &MeetingStatePatch) {
        fn apply(field: &mut bool, value: Option<bool>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        apply(&mut self.is_muted, patch.is_muted);
        apply(&mut self.is_video_on, patch.is_video_on);
        apply(&mut self.is_hand_raised, patch.is_hand_raised);
        apply(&mut self.is_in_meeting, patch.is_in_meeting);
        apply(&mut self.is_recording_on, patch.is_recording_on);
        apply(&mut self.is_background_blurred, patch.is_background_blurred);
        apply(&mut self.is_sharing, patch.is_sharing);
        apply(&mut self.has_unread_messages, patch.has_unread_messages);
    }

    /// Names and new values of the fields that differ from `previous`.
    pub fn changes_since(&self, previous: &MeetingState) -> Vec<(&'static str, bool)> {
        let pairs = [
            ("muted", previous.is_muted, self.is_muted),
            ("video", previous.is_video_on, self.is_video_on),
            ("hand_raised", previous.is_hand_raised, self.is_hand_raised),
            ("in_meeting", previous.is_in_meeting, self.is_in_meeting),
            ("recording", previous.is_recording_on, self.is_recording_on),
            (
                "background_blurred",
                previous.is_background_blurred,
                self.is_background_blurred,
            ),
            ("sharing", previous.is_sharing, self.is_sharing),
            (
                "unread_messages",
                previous.has_unread_messages,
                self.has_unread_messages,
            ),
        ];

        pairs
            .into_iter()
            .filter(|(_, before, after)| before != after)
            .map(|(name, _, after)| (name, after))
            .collect()
    }
}

/// Which toggle actions the meeting client currently allows.
///
/// Advisory only: nothing here is enforced before sending a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingPermissions(BTreeMap<String, bool>);

impl MeetingPermissions {
    pub fn merge(&mut self, update: &BTreeMap<String, bool>) {
        for (name, allowed) in update {
            self.0.insert(name.clone(), *allowed);
        }
    }

    pub fn allows(&self, capability: &str) -> bool {
        self.0.get(capability).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(name, allowed)| (name.as_str(), *allowed))
    }
}
