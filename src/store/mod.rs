//! Local persistence of recording sessions, keyed by session id.

pub mod file;
pub mod memory;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::recording::schema::RecordingSession;
use async_trait::async_trait;
use std::sync::Arc;

pub use file::JsonSessionStore;
pub use memory::MemorySessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. An id that is already stored is rejected.
    async fn put(&self, session: &RecordingSession) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<RecordingSession>>;

    /// All sessions, oldest first.
    async fn list(&self) -> Result<Vec<RecordingSession>>;

    /// Remove a session. Removing an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Open the store selected by the storage configuration.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn SessionStore>> {
    match config.backend {
        StorageBackend::File => {
            let dir = config.sessions_dir();
            Ok(Arc::new(JsonSessionStore::open(dir)?))
        }
        StorageBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
    }
}

fn sort_chronologically(sessions: &mut [RecordingSession]) {
    sessions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}
