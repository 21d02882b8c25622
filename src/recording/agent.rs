//! Per-tab recording agent: drives one tab's capture in response to
//! coordinator messages and ships the captured batches back.

use crate::error::{Result, TabreelError};
use crate::host::{TabInbox, TabRegistry};
use crate::protocol::{Message, Reply, TabId};
use crate::recording::capture::{BufferedCapture, CaptureAdapter, CaptureSink};
use crate::recording::coordinator::CoordinatorHandle;
use crate::recording::schema::RecordingEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct TabAgent<C: CaptureAdapter> {
    tab_id: TabId,
    capture: C,
    coordinator: CoordinatorHandle,
    active: watch::Sender<bool>,
}

impl<C: CaptureAdapter> TabAgent<C> {
    pub fn new(tab_id: TabId, capture: C, coordinator: CoordinatorHandle) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            tab_id,
            capture,
            coordinator,
            active,
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// "Recording active" flag of this tab, for observers in the same context.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    /// Handle one message from the coordinator. Batches are handed to the
    /// coordinator before this returns.
    pub fn handle(&mut self, message: Message) -> Result<Reply> {
        match message {
            Message::RecordingStart => {
                self.start();
                Ok(Reply::Ack)
            }
            Message::RecordingStop => {
                self.stop()?;
                Ok(Reply::Ack)
            }
            Message::TabSwitch => {
                self.switch_away()?;
                Ok(Reply::Ack)
            }
            other => Err(TabreelError::Protocol(format!(
                "{} is not handled by tab agents",
                other.message_type()
            ))),
        }
    }

    fn start(&mut self) {
        if self.capture.is_active() {
            return;
        }
        self.capture.start();
        self.active.send_replace(true);
        tracing::info!("Recording started in tab {}", self.tab_id);
    }

    fn stop(&mut self) -> Result<()> {
        let was_active = self.capture.is_active();
        if was_active {
            self.capture.stop();
            let events = self.capture.drain_events();
            tracing::info!(
                "Recording stopped in tab {}. Events captured: {}",
                self.tab_id,
                events.len()
            );
            self.transmit(events)?;
        }
        self.active.send_replace(false);
        Ok(())
    }

    /// Ship what was captured so far and keep capturing into a fresh buffer.
    fn switch_away(&mut self) -> Result<()> {
        if !self.capture.is_active() {
            return Ok(());
        }
        self.capture.stop();
        let events = self.capture.drain_events();
        tracing::info!(
            "Saving {} events before tab switch in tab {}",
            events.len(),
            self.tab_id
        );
        self.transmit(events)?;
        self.capture.start();
        tracing::debug!("Recording restarted in tab {}", self.tab_id);
        Ok(())
    }

    fn transmit(&self, events: Vec<RecordingEvent>) -> Result<()> {
        self.coordinator.recording_data(self.tab_id, events)
    }

    /// Serve messages until the tab's listener is unregistered.
    pub async fn run(mut self, mut inbox: TabInbox) {
        while let Some(request) = inbox.recv().await {
            let result = self.handle(request.message);
            if let Err(e) = &result {
                tracing::warn!("Tab {} failed to handle message: {}", self.tab_id, e);
            }
            let _ = request.reply.send(result);
        }
        if self.capture.is_active() {
            self.capture.stop();
        }
        self.active.send_replace(false);
        tracing::debug!("Agent for tab {} exited", self.tab_id);
    }
}

/// A running agent backed by a [`BufferedCapture`].
pub struct TabAgentHandle {
    tab_id: TabId,
    sink: CaptureSink,
    active: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl TabAgentHandle {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.active.clone()
    }

    /// Feed events emitted by the page recorder. Returns how many were kept.
    pub fn emit(&self, events: Vec<RecordingEvent>) -> usize {
        self.sink.emit_all(events)
    }

    pub fn buffered(&self) -> usize {
        self.sink.buffered()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Register `tab_id` with the registry and spawn its agent task.
pub fn spawn_tab_agent(
    registry: &TabRegistry,
    tab_id: TabId,
    coordinator: CoordinatorHandle,
) -> TabAgentHandle {
    let capture = BufferedCapture::new();
    let sink = capture.sink();
    let agent = TabAgent::new(tab_id, capture, coordinator);
    let active = agent.subscribe();
    let inbox = registry.register(tab_id);
    let task = tokio::spawn(agent.run(inbox));

    TabAgentHandle {
        tab_id,
        sink,
        active,
        task,
    }
}
