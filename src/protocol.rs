//! Message protocol between the control surface, the recording coordinator
//! and the per-tab agents.
//!
//! Every message is a request/response pair keyed by a kebab-case tag:
//! `{"type": "recording-data", "data": {"events": [...]}}`.

use crate::recording::schema::RecordingEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser tab identifier as reported by the host environment.
pub type TabId = u64;

/// Tag of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    IsRecording,
    RecordingStart,
    RecordingStop,
    RecordingData,
    TabSwitch,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::IsRecording => "is-recording",
            MessageType::RecordingStart => "recording-start",
            MessageType::RecordingStop => "recording-stop",
            MessageType::RecordingData => "recording-data",
            MessageType::TabSwitch => "tab-switch",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `recording-data`: one tab's batch of captured events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDataRequest {
    pub events: Vec<RecordingEvent>,
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Message {
    IsRecording,
    RecordingStart,
    RecordingStop,
    RecordingData(RecordingDataRequest),
    TabSwitch,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::IsRecording => MessageType::IsRecording,
            Message::RecordingStart => MessageType::RecordingStart,
            Message::RecordingStop => MessageType::RecordingStop,
            Message::RecordingData(_) => MessageType::RecordingData,
            Message::TabSwitch => MessageType::TabSwitch,
        }
    }
}

/// Response to `is-recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsRecordingResponse {
    pub is_recording: bool,
}

/// Response to a `recording-stop` issued by the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    /// Id of the session written by the stop, if history was non-empty.
    pub session_id: Option<String>,
}

/// Response to a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Reply {
    Ack,
    IsRecording(IsRecordingResponse),
    Stopped(StopResponse),
}

/// A message together with the tab that sent it. `sender` is `None` for the
/// control surface and set for agent-originated messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<TabId>,
    pub message: Message,
}

impl Envelope {
    pub fn from_ui(message: Message) -> Self {
        Self {
            sender: None,
            message,
        }
    }

    pub fn from_tab(tab_id: TabId, message: Message) -> Self {
        Self {
            sender: Some(tab_id),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_tags() {
        let json = serde_json::to_value(Message::TabSwitch).unwrap();
        assert_eq!(json["type"], "tab-switch");

        let parsed: Message = serde_json::from_str(r#"{"type":"is-recording"}"#).unwrap();
        assert_eq!(parsed, Message::IsRecording);
        assert_eq!(parsed.message_type().as_str(), "is-recording");
    }

    #[test]
    fn test_recording_data_payload() {
        let raw = r#"{"type":"recording-data","data":{"events":[{"type":2,"timestamp":10}]}}"#;
        let parsed: Message = serde_json::from_str(raw).unwrap();
        match parsed {
            Message::RecordingData(req) => {
                assert_eq!(req.events.len(), 1);
                assert_eq!(req.events[0].timestamp(), Some(10));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_is_recording_response_camel_case() {
        let json = serde_json::to_string(&IsRecordingResponse { is_recording: true }).unwrap();
        assert_eq!(json, r#"{"isRecording":true}"#);
    }

    #[test]
    fn test_envelope_sender_optional() {
        let env: Envelope =
            serde_json::from_str(r#"{"message":{"type":"recording-stop"}}"#).unwrap();
        assert_eq!(env, Envelope::from_ui(Message::RecordingStop));

        let env: Envelope =
            serde_json::from_str(r#"{"sender":7,"message":{"type":"tab-switch"}}"#).unwrap();
        assert_eq!(env.sender, Some(7));
    }
}
