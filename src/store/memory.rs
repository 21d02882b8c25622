//! Volatile session store, used when persistence is disabled.

use crate::error::{Result, TabreelError};
use crate::recording::schema::RecordingSession;
use crate::store::{sort_chronologically, SessionStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, RecordingSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: &RecordingSession) -> Result<String> {
        let mut map = self.sessions.write();
        if map.contains_key(&session.id) {
            return Err(TabreelError::DuplicateSession(session.id.clone()));
        }
        map.insert(session.id.clone(), session.clone());
        Ok(session.id.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<RecordingSession>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<RecordingSession>> {
        let mut sessions: Vec<RecordingSession> = self.sessions.read().values().cloned().collect();
        sort_chronologically(&mut sessions);
        Ok(sessions)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.write().remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.sessions.write().clear();
        Ok(())
    }
}
