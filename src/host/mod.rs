//! Host environment as seen by the recording coordinator: which tab is
//! active, and message delivery to the agent living in a tab.

pub mod tabs;

use crate::error::Result;
use crate::protocol::{Message, Reply, TabId};
use async_trait::async_trait;

pub use tabs::{TabInbox, TabRegistry, TabRequest};

#[async_trait]
pub trait TabHost: Send + Sync {
    /// The tab currently focused in the browser, if any.
    async fn active_tab(&self) -> Result<Option<TabId>>;

    /// Deliver `message` to the agent of `tab_id` and wait for its reply.
    /// Fails with `TabreelError::Unreachable` when nobody is listening.
    async fn send(&self, tab_id: TabId, message: Message) -> Result<Reply>;
}
