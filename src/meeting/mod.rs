//! Meeting state as reported by the meeting client.
//!
//! [`state`] holds the merged flags, [`tracker`] turns updates into
//! lifecycle transitions.

pub mod state;
pub mod tracker;

pub use state::{MeetingPermissions, MeetingState};
pub use tracker::{MeetingSnapshot, MeetingStateTracker, MeetingTransition};
