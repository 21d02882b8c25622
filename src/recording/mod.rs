//! Recording module: per-tab capture agents and the cross-tab coordinator.

pub mod agent;
pub mod capture;
pub mod coordinator;
pub mod schema;

pub use agent::{spawn_tab_agent, TabAgent, TabAgentHandle};
pub use capture::{BufferedCapture, CaptureAdapter, CaptureSink};
pub use coordinator::{spawn_coordinator, CoordinatorHandle, CoordinatorSnapshot, RecordingNotice};
pub use schema::{RecordingEvent, RecordingSession, RecordingState, SessionSummary, TabEventBatch};
