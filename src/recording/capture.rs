//! Capture adapter: the seam between a tab agent and the page recording
//! library.

use crate::recording::schema::RecordingEvent;
use parking_lot::Mutex;
use std::sync::Arc;

/// Start/stop control over the page recording library plus access to the
/// events it has emitted since the last start.
pub trait CaptureAdapter: Send + 'static {
    fn start(&mut self);
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    /// Take every buffered event, leaving the buffer empty.
    fn drain_events(&mut self) -> Vec<RecordingEvent>;
}

#[derive(Debug, Default)]
struct CaptureBuffer {
    active: bool,
    events: Vec<RecordingEvent>,
}

/// Buffering capture fed from outside through a [`CaptureSink`].
///
/// Events are kept only while the capture is active, mirroring a recorder
/// whose emit callback is detached on stop.
#[derive(Debug, Clone, Default)]
pub struct BufferedCapture {
    buffer: Arc<Mutex<CaptureBuffer>>,
}

impl BufferedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle through which the recording library's emitted events arrive.
    pub fn sink(&self) -> CaptureSink {
        CaptureSink {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl CaptureAdapter for BufferedCapture {
    fn start(&mut self) {
        let mut buf = self.buffer.lock();
        if buf.active {
            return;
        }
        buf.active = true;
        buf.events.clear();
    }

    fn stop(&mut self) {
        self.buffer.lock().active = false;
    }

    fn is_active(&self) -> bool {
        self.buffer.lock().active
    }

    fn drain_events(&mut self) -> Vec<RecordingEvent> {
        std::mem::take(&mut self.buffer.lock().events)
    }
}

/// Emit side of a [`BufferedCapture`].
#[derive(Debug, Clone)]
pub struct CaptureSink {
    buffer: Arc<Mutex<CaptureBuffer>>,
}

impl CaptureSink {
    /// Push one event. Returns `false` if the capture is not running and the
    /// event was dropped.
    pub fn emit(&self, event: RecordingEvent) -> bool {
        let mut buf = self.buffer.lock();
        if !buf.active {
            return false;
        }
        buf.events.push(event);
        true
    }

    /// Push several events, returning how many were kept.
    pub fn emit_all(&self, events: impl IntoIterator<Item = RecordingEvent>) -> usize {
        let mut buf = self.buffer.lock();
        if !buf.active {
            return 0;
        }
        let before = buf.events.len();
        buf.events.extend(events);
        buf.events.len() - before
    }

    pub fn is_active(&self) -> bool {
        self.buffer.lock().active
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().events.len()
    }
}
