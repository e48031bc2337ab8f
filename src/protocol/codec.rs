//! JSON envelopes exchanged over the control channel.
//!
//! Inbound frames carry no type tag; their kind is decided by which top-level
//! key is present (`meetingUpdate`, `tokenRefresh`, or `requestId` + `response`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::DecodeError;

/// Partial meeting state carried by a `meetingUpdate` frame.
///
/// Every field is optional: a frame only overwrites the fields it carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_video_on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hand_raised: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_in_meeting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recording_on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_background_blurred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sharing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_unread_messages: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingUpdate {
    #[serde(default)]
    pub meeting_state: Option<MeetingStatePatch>,
    /// Capability name → currently allowed, e.g. `canToggleMute`
    #[serde(default)]
    pub meeting_permissions: Option<BTreeMap<String, bool>>,
}

/// Confirmation for a previously sent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_id: u64,
    pub response: String,
}

impl RequestResponse {
    pub fn is_success(&self) -> bool {
        self.response.eq_ignore_ascii_case("success")
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    MeetingUpdate(MeetingUpdate),
    Response(RequestResponse),
    TokenRefresh(String),
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::MeetingUpdate(_) => "meetingUpdate",
            InboundMessage::Response(_) => "response",
            InboundMessage::TokenRefresh(_) => "tokenRefresh",
        }
    }
}

/// Outbound command frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub request_id: u64,
    pub api_version: String,
    pub action: String,
}

pub fn decode(text: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    if let Some(update) = object.remove("meetingUpdate") {
        let update: MeetingUpdate =
            serde_json::from_value(update).map_err(|e| DecodeError::Field("meetingUpdate", e))?;
        return Ok(InboundMessage::MeetingUpdate(update));
    }

    if let Some(token) = object.remove("tokenRefresh") {
        return match token {
            Value::String(token) if !token.is_empty() => Ok(InboundMessage::TokenRefresh(token)),
            _ => Err(DecodeError::EmptyToken),
        };
    }

    if object.contains_key("requestId") && object.contains_key("response") {
        let response: RequestResponse = serde_json::from_value(Value::Object(object))
            .map_err(|e| DecodeError::Field("response", e))?;
        return Ok(InboundMessage::Response(response));
    }

    let mut keys: Vec<String> = object.keys().cloned().collect();
    keys.sort();
    Err(DecodeError::UnknownShape(keys.join(",")))
}

pub fn encode(envelope: &RequestEnvelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}
