//! Recording coordinator: owns the global recording state and the
//! accumulated multi-tab history, and flushes it to the session store.
//!
//! The coordinator runs as a single tokio task that processes one [`Signal`]
//! at a time. All mutation of the state and history happens inside that task,
//! so none of it needs a lock. Everything else talks to it through a cloneable
//! [`CoordinatorHandle`].

use crate::error::{Result, TabreelError};
use crate::host::TabHost;
use crate::protocol::{
    Envelope, IsRecordingResponse, Message, Reply, StopResponse, TabId,
};
use crate::recording::schema::{
    RecordingEvent, RecordingSession, RecordingState, SessionSummary, TabEventBatch,
};
use crate::store::SessionStore;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Maximum number of notices buffered per subscriber.
const NOTICE_CAPACITY: usize = 100;

type FlushReply = oneshot::Sender<Result<Option<String>>>;

/// Inputs processed by the coordinator task, one at a time.
#[derive(Debug)]
enum Signal {
    Start { reply: oneshot::Sender<()> },
    Stop { reply: FlushReply },
    /// Queued by the coordinator itself once every stopped tab acknowledged;
    /// the trailing batches of those tabs are ahead of it in the inbox.
    StopSettled,
    Flush { reply: FlushReply },
    TabActivated { tab_id: TabId },
    RecordingData { tab_id: TabId, events: Vec<RecordingEvent> },
    Snapshot { reply: oneshot::Sender<CoordinatorSnapshot> },
}

/// Observable changes of the coordinator, pushed to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RecordingNotice {
    StateChanged { is_recording: bool },
    TabActivated { tab_id: TabId },
    BatchReceived { tab_id: TabId, events: usize },
    SessionSaved(SessionSummary),
    FlushFailed { batches: usize, error: String },
}

/// Point-in-time copy of the coordinator's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSnapshot {
    pub state: RecordingState,
    pub history: Vec<TabEventBatch>,
    pub pending_stops: usize,
}

/// Cloneable entry point to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Signal>,
    status: watch::Receiver<bool>,
    notices: broadcast::Sender<RecordingNotice>,
}

impl CoordinatorHandle {
    /// Current recording flag. Answered from the last published state, so it
    /// never waits behind in-flight tab messages.
    pub fn is_recording(&self) -> bool {
        *self.status.borrow()
    }

    /// Turn recording on and attach capture to the active tab.
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Signal::Start { reply })?;
        rx.await.map_err(|_| TabreelError::CoordinatorClosed)
    }

    /// Turn recording off, collect the trailing batches of the recording
    /// tabs and flush. Returns the id of the written session, or `None` when
    /// there was nothing to write.
    pub async fn stop(&self) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(Signal::Stop { reply })?;
        rx.await.map_err(|_| TabreelError::CoordinatorClosed)?
    }

    /// Flush the accumulated history now, whatever the recording state.
    pub async fn flush(&self) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(Signal::Flush { reply })?;
        rx.await.map_err(|_| TabreelError::CoordinatorClosed)?
    }

    /// Host notification that `tab_id` became the focused tab.
    pub fn tab_activated(&self, tab_id: TabId) -> Result<()> {
        self.send(Signal::TabActivated { tab_id })
    }

    /// A batch transmitted by the agent of `tab_id`.
    pub fn recording_data(&self, tab_id: TabId, events: Vec<RecordingEvent>) -> Result<()> {
        self.send(Signal::RecordingData { tab_id, events })
    }

    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Signal::Snapshot { reply })?;
        rx.await.map_err(|_| TabreelError::CoordinatorClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordingNotice> {
        self.notices.subscribe()
    }

    /// Handler table for protocol messages addressed to the coordinator.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<Reply> {
        match envelope.message {
            Message::IsRecording => Ok(Reply::IsRecording(IsRecordingResponse {
                is_recording: self.is_recording(),
            })),
            Message::RecordingStart => {
                self.start().await?;
                Ok(Reply::Ack)
            }
            Message::RecordingStop => {
                let session_id = self.stop().await?;
                Ok(Reply::Stopped(StopResponse { session_id }))
            }
            Message::RecordingData(request) => {
                let tab_id = envelope.sender.ok_or_else(|| {
                    TabreelError::Protocol("recording-data requires a sender tab".to_string())
                })?;
                self.recording_data(tab_id, request.events)?;
                Ok(Reply::Ack)
            }
            Message::TabSwitch => Err(TabreelError::Protocol(
                "tab-switch is only delivered to tab agents".to_string(),
            )),
        }
    }

    fn send(&self, signal: Signal) -> Result<()> {
        self.tx
            .send(signal)
            .map_err(|_| TabreelError::CoordinatorClosed)
    }
}

/// Spawn a coordinator task with fresh idle state. Must be called from
/// within a tokio runtime.
pub fn spawn_coordinator(
    host: Arc<dyn TabHost>,
    store: Arc<dyn SessionStore>,
) -> CoordinatorHandle {
    let (tx, inbox) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(false);
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

    let coordinator = RecordingCoordinator {
        state: RecordingState::default(),
        history: Vec::new(),
        engaged: BTreeSet::new(),
        pending_stops: VecDeque::new(),
        host,
        store,
        inbox,
        loopback: tx.downgrade(),
        status: status_tx,
        notices: notices.clone(),
    };
    tokio::spawn(coordinator.run());

    CoordinatorHandle {
        tx,
        status: status_rx,
        notices,
    }
}

struct RecordingCoordinator {
    state: RecordingState,
    history: Vec<TabEventBatch>,
    /// Tabs sent `recording-start` since recording was last turned on.
    engaged: BTreeSet<TabId>,
    /// Stop callers waiting for their `StopSettled` marker.
    pending_stops: VecDeque<FlushReply>,
    host: Arc<dyn TabHost>,
    store: Arc<dyn SessionStore>,
    inbox: mpsc::UnboundedReceiver<Signal>,
    loopback: mpsc::WeakUnboundedSender<Signal>,
    status: watch::Sender<bool>,
    notices: broadcast::Sender<RecordingNotice>,
}

impl RecordingCoordinator {
    async fn run(mut self) {
        tracing::info!("Recording coordinator started");
        while let Some(signal) = self.inbox.recv().await {
            self.handle(signal).await;
        }
        tracing::info!("Recording coordinator stopped");
    }

    async fn handle(&mut self, signal: Signal) {
        match signal {
            Signal::Start { reply } => {
                self.handle_start().await;
                let _ = reply.send(());
            }
            Signal::Stop { reply } => self.handle_stop(reply).await,
            Signal::StopSettled => {
                if let Some(reply) = self.pending_stops.pop_front() {
                    let result = self.flush().await;
                    let _ = reply.send(result);
                }
            }
            Signal::Flush { reply } => {
                let result = self.flush().await;
                let _ = reply.send(result);
            }
            Signal::TabActivated { tab_id } => self.handle_tab_activated(tab_id).await,
            Signal::RecordingData { tab_id, events } => {
                self.handle_recording_data(tab_id, events).await
            }
            Signal::Snapshot { reply } => {
                let _ = reply.send(CoordinatorSnapshot {
                    state: self.state,
                    history: self.history.clone(),
                    pending_stops: self.pending_stops.len(),
                });
            }
        }
    }

    async fn handle_start(&mut self) {
        if self.state.is_recording {
            tracing::debug!("Recording already active, ignoring start");
            return;
        }
        self.set_recording(true);

        match self.host.active_tab().await {
            Ok(Some(tab_id)) => {
                self.state.current_tab_id = Some(tab_id);
                tracing::info!("Starting recording on active tab {}", tab_id);
                self.start_tab(tab_id).await;
            }
            Ok(None) => {
                tracing::warn!("No active tab; recording is on but nothing is captured until a tab is activated");
            }
            Err(e) => {
                tracing::error!("Failed to start recording on active tab: {}", e);
            }
        }
    }

    async fn handle_stop(&mut self, reply: FlushReply) {
        if !self.state.is_recording {
            tracing::debug!("Recording already stopped");
            // Answer after an earlier stop still collecting its batches
            if !self.pending_stops.is_empty() && self.queue_settled() {
                self.pending_stops.push_back(reply);
                return;
            }
            let result = self.flush().await;
            let _ = reply.send(result);
            return;
        }
        self.set_recording(false);

        let current = self.state.current_tab_id;
        let mut targets: Vec<TabId> = current.into_iter().collect();
        targets.extend(self.engaged.iter().copied().filter(|t| Some(*t) != current));
        self.engaged.clear();

        let mut delivered = 0;
        for tab_id in targets {
            match self.host.send(tab_id, Message::RecordingStop).await {
                Ok(_) => {
                    tracing::info!("Stopped recording on tab {}", tab_id);
                    delivered += 1;
                }
                Err(e) => tracing::warn!("Could not stop recording on tab {}: {}", tab_id, e),
            }
        }

        if delivered > 0 && self.queue_settled() {
            self.pending_stops.push_back(reply);
            return;
        }

        let result = self.flush().await;
        let _ = reply.send(result);
    }

    /// Put a `StopSettled` marker behind everything already in the inbox.
    fn queue_settled(&self) -> bool {
        self.loopback
            .upgrade()
            .is_some_and(|tx| tx.send(Signal::StopSettled).is_ok())
    }

    async fn handle_tab_activated(&mut self, tab_id: TabId) {
        if !self.state.is_recording {
            tracing::info!("Recording is not active, ignoring tab switch");
            return;
        }

        self.state.previous_tab_id = self.state.current_tab_id;
        self.state.current_tab_id = Some(tab_id);
        tracing::info!(
            "Tab switch detected - from: {:?} to: {}",
            self.state.previous_tab_id,
            tab_id
        );
        self.notify(RecordingNotice::TabActivated { tab_id });

        if let Some(previous) = self.state.previous_tab_id.filter(|p| *p != tab_id) {
            match self.host.send(previous, Message::TabSwitch).await {
                Ok(_) => tracing::info!("Tab switch message sent to previous tab {}", previous),
                Err(e) => tracing::warn!(
                    "Could not send tab switch message to previous tab {}: {}",
                    previous,
                    e
                ),
            }
        }

        self.start_tab(tab_id).await;
    }

    async fn handle_recording_data(&mut self, tab_id: TabId, events: Vec<RecordingEvent>) {
        if events.is_empty() {
            tracing::debug!("Received empty batch from tab {}", tab_id);
        } else {
            tracing::info!("Received {} events from tab {}", events.len(), tab_id);
            self.notify(RecordingNotice::BatchReceived {
                tab_id,
                events: events.len(),
            });
            self.history.push(TabEventBatch::new(tab_id, events));
        }

        // A batch arriving after recording was turned off, with no stop
        // waiting for it, is the last one of the session.
        if !self.state.is_recording && self.pending_stops.is_empty() && !self.history.is_empty() {
            match self.flush().await {
                Ok(_) => self.log_stored_sessions().await,
                Err(e) => tracing::error!("Error saving trailing recording session: {}", e),
            }
        }
    }

    async fn start_tab(&mut self, tab_id: TabId) {
        match self.host.send(tab_id, Message::RecordingStart).await {
            Ok(_) => {
                self.engaged.insert(tab_id);
                tracing::info!("Recording start message sent to tab {}", tab_id);
            }
            Err(e) => tracing::warn!(
                "Could not send recording start message to tab {}: {}",
                tab_id,
                e
            ),
        }
    }

    /// Persist the history as one new session. The history is only cleared
    /// once the store accepted the write.
    async fn flush(&mut self) -> Result<Option<String>> {
        if self.history.is_empty() {
            tracing::info!("Recording history is empty");
            return Ok(None);
        }

        let session = RecordingSession::new(std::mem::take(&mut self.history));
        match self.store.put(&session).await {
            Ok(id) => {
                tracing::info!(
                    "Recording session saved with ID {} ({} batches, {} events)",
                    id,
                    session.recording_history.len(),
                    session.total_events()
                );
                self.notify(RecordingNotice::SessionSaved(session.summary()));
                Ok(Some(id))
            }
            Err(e) => {
                let batches = session.recording_history.len();
                tracing::error!(
                    "Error saving recording session, keeping {} batches: {}",
                    batches,
                    e
                );
                self.history = session.recording_history;
                self.notify(RecordingNotice::FlushFailed {
                    batches,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn log_stored_sessions(&self) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        match self.store.list().await {
            Ok(sessions) => {
                tracing::debug!("Found {} stored sessions", sessions.len());
                for (index, session) in sessions.iter().enumerate() {
                    let summary = session.summary();
                    tracing::debug!(
                        "Session {}: id={} timestamp={} batches={} events={}",
                        index + 1,
                        summary.id,
                        summary.timestamp,
                        summary.tab_count,
                        summary.total_events
                    );
                }
            }
            Err(e) => tracing::debug!("Error listing sessions: {}", e),
        }
    }

    fn set_recording(&mut self, is_recording: bool) {
        self.state.is_recording = is_recording;
        self.status.send_replace(is_recording);
        self.notify(RecordingNotice::StateChanged { is_recording });
    }

    fn notify(&self, notice: RecordingNotice) {
        let _ = self.notices.send(notice);
    }
}
