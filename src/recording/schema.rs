//! Recording data structures: captured events, per-tab batches and sessions.

use crate::protocol::TabId;
use serde::{Deserialize, Serialize};

/// A single event emitted by the page recording library. Opaque apart from
/// its `timestamp` (ms), which only the replayer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingEvent(pub serde_json::Value);

impl RecordingEvent {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Capture time of the event, if the payload carries one.
    pub fn timestamp(&self) -> Option<u64> {
        self.0.get("timestamp").and_then(|t| t.as_u64())
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for RecordingEvent {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Events captured by one tab since its last start, as received by the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabEventBatch {
    pub tab_id: TabId,
    pub events: Vec<RecordingEvent>,
    /// Arrival time at the coordinator (unix ms).
    pub timestamp: u64,
}

impl TabEventBatch {
    pub fn new(tab_id: TabId, events: Vec<RecordingEvent>) -> Self {
        Self {
            tab_id,
            events,
            timestamp: now_ms(),
        }
    }
}

/// One persisted unit of recorded history, possibly spanning several tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: String,
    /// Creation time (unix ms).
    pub timestamp: u64,
    pub recording_history: Vec<TabEventBatch>,
}

impl RecordingSession {
    pub fn new(recording_history: Vec<TabEventBatch>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_ms(),
            recording_history,
        }
    }

    pub fn total_events(&self) -> usize {
        self.recording_history.iter().map(|b| b.events.len()).sum()
    }

    /// All events of the session in history order, ready for replay.
    pub fn flatten_events(&self) -> Vec<RecordingEvent> {
        self.recording_history
            .iter()
            .flat_map(|b| b.events.iter().cloned())
            .collect()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            tab_count: self.recording_history.len(),
            total_events: self.total_events(),
        }
    }
}

/// Listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub timestamp: u64,
    /// Number of batches in the history (one per tab visit).
    pub tab_count: usize,
    pub total_events: usize,
}

/// Process-wide recording state owned by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub is_recording: bool,
    pub previous_tab_id: Option<TabId>,
    pub current_tab_id: Option<TabId>,
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(n: usize) -> Vec<RecordingEvent> {
        (0..n)
            .map(|i| RecordingEvent::new(json!({ "type": 3, "timestamp": 1000 + i as u64 })))
            .collect()
    }

    #[test]
    fn test_session_stored_layout() {
        let session = RecordingSession::new(vec![TabEventBatch::new(4, events(2))]);
        let json = serde_json::to_value(&session).unwrap();

        assert!(json["id"].is_string());
        assert!(json["timestamp"].is_u64());
        assert_eq!(json["recordingHistory"][0]["tabId"], 4);
        assert_eq!(json["recordingHistory"][0]["events"][1]["timestamp"], 1001);
    }

    #[test]
    fn test_session_ids_unique() {
        let a = RecordingSession::new(vec![]);
        let b = RecordingSession::new(vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_summary_counts() {
        let session = RecordingSession::new(vec![
            TabEventBatch::new(1, events(5)),
            TabEventBatch::new(2, events(3)),
        ]);
        let summary = session.summary();
        assert_eq!(summary.tab_count, 2);
        assert_eq!(summary.total_events, 8);
        assert_eq!(session.flatten_events().len(), 8);
    }

    #[test]
    fn test_event_without_timestamp() {
        let event = RecordingEvent::new(json!({ "type": 4 }));
        assert_eq!(event.timestamp(), None);
    }

    #[test]
    fn test_default_state_is_idle() {
        let state = RecordingState::default();
        assert!(!state.is_recording);
        assert!(state.previous_tab_id.is_none());
        assert!(state.current_tab_id.is_none());
    }
}
