//! In-process tab registry: routes protocol messages to tab agents over
//! channels and tracks the active tab reported by the browser.

use crate::error::{Result, TabreelError};
use crate::host::TabHost;
use crate::protocol::{Message, Reply, TabId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// A message delivered to a tab together with its reply slot.
#[derive(Debug)]
pub struct TabRequest {
    pub message: Message,
    pub reply: oneshot::Sender<Result<Reply>>,
}

pub type TabInbox = mpsc::UnboundedReceiver<TabRequest>;

pub struct TabRegistry {
    tabs: RwLock<HashMap<TabId, mpsc::UnboundedSender<TabRequest>>>,
    active: RwLock<Option<TabId>>,
    timeout: Duration,
}

impl TabRegistry {
    /// `timeout` bounds how long a send waits for the tab's reply.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tabs: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            timeout,
        }
    }

    /// Register a listener for `tab_id`, replacing any previous one.
    pub fn register(&self, tab_id: TabId) -> TabInbox {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.tabs.write().insert(tab_id, tx).is_some() {
            tracing::debug!("Replaced listener for tab {}", tab_id);
        }
        rx
    }

    /// Drop the listener of a closed tab. Returns whether it was registered.
    pub fn unregister(&self, tab_id: TabId) -> bool {
        let removed = self.tabs.write().remove(&tab_id).is_some();
        let mut active = self.active.write();
        if *active == Some(tab_id) {
            *active = None;
        }
        removed
    }

    pub fn is_registered(&self, tab_id: TabId) -> bool {
        self.tabs.read().contains_key(&tab_id)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_active(&self, tab_id: TabId) {
        *self.active.write() = Some(tab_id);
    }

    pub fn active(&self) -> Option<TabId> {
        *self.active.read()
    }
}

#[async_trait]
impl TabHost for TabRegistry {
    async fn active_tab(&self) -> Result<Option<TabId>> {
        Ok(self.active())
    }

    async fn send(&self, tab_id: TabId, message: Message) -> Result<Reply> {
        let tx = self
            .tabs
            .read()
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| TabreelError::unreachable(tab_id, "no listener registered"))?;

        let kind = message.message_type();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(TabRequest {
            message,
            reply: reply_tx,
        })
        .map_err(|_| TabreelError::unreachable(tab_id, "tab listener closed"))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TabreelError::unreachable(
                tab_id,
                format!("{} dropped without a reply", kind),
            )),
            Err(_) => Err(TabreelError::unreachable(
                tab_id,
                format!("no reply to {} within {:?}", kind, self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_to_unknown_tab_is_unreachable() {
        let registry = TabRegistry::new(Duration::from_millis(100));
        let err = registry.send(9, Message::TabSwitch).await.unwrap_err();
        assert!(matches!(err, TabreelError::Unreachable { tab_id: 9, .. }));
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let registry = TabRegistry::new(Duration::from_secs(1));
        let mut inbox = registry.register(1);
        tokio::spawn(async move {
            while let Some(req) = inbox.recv().await {
                assert_eq!(req.message, Message::RecordingStart);
                let _ = req.reply.send(Ok(Reply::Ack));
            }
        });
        let reply = registry.send(1, Message::RecordingStart).await.unwrap();
        assert_eq!(reply, Reply::Ack);
    }

    #[tokio::test]
    async fn test_silent_tab_times_out() {
        let registry = TabRegistry::new(Duration::from_millis(20));
        let _inbox = registry.register(2);
        let err = registry.send(2, Message::RecordingStop).await.unwrap_err();
        assert!(err.to_string().contains("no reply"));
    }

    #[tokio::test]
    async fn test_closed_tab_is_unreachable() {
        let registry = TabRegistry::new(Duration::from_secs(1));
        drop(registry.register(3));
        assert!(registry.send(3, Message::TabSwitch).await.is_err());
    }

    #[test]
    fn test_unregister_clears_active() {
        let registry = TabRegistry::new(Duration::from_secs(1));
        let _inbox = registry.register(5);
        registry.set_active(5);
        assert!(registry.unregister(5));
        assert_eq!(registry.active(), None);
        assert!(!registry.unregister(5));
    }
}
