//! Session store backed by a directory of JSON files, one per session.

use crate::error::{Result, TabreelError};
use crate::recording::schema::RecordingSession;
use crate::store::{sort_chronologically, SessionStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct JsonSessionStore {
    dir: PathBuf,
    sessions: RwLock<HashMap<String, RecordingSession>>,
}

impl JsonSessionStore {
    /// Open the store at `dir`, creating the directory if it is absent and
    /// loading every stored session into memory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            sessions: RwLock::new(HashMap::new()),
        };
        store.load_all()?;
        tracing::info!(
            "Opened session store at {:?} ({} sessions)",
            store.dir,
            store.sessions.read().len()
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn load_all(&self) -> Result<()> {
        let mut map = self.sessions.write();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match load_one(&path) {
                Ok(session) => {
                    map.insert(session.id.clone(), session);
                }
                Err(e) => {
                    tracing::warn!("Failed to load session from {:?}: {}", path, e);
                }
            }
        }

        Ok(())
    }
}

fn load_one(path: &Path) -> Result<RecordingSession> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(TabreelError::Store(format!("invalid session id {:?}", id)));
    }
    Ok(())
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn put(&self, session: &RecordingSession) -> Result<String> {
        validate_id(&session.id)?;
        if self.sessions.read().contains_key(&session.id) {
            return Err(TabreelError::DuplicateSession(session.id.clone()));
        }

        let path = self.session_path(&session.id);
        let content = serde_json::to_string_pretty(session)?;

        // Write to a temp file and rename so a crash never leaves half a session
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp_path = path.with_extension("json.tmp");
        let written = match tokio::fs::write(&tmp_path, content).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                tracing::debug!("Could not remove {:?}: {}", tmp_path, cleanup);
            }
            return Err(e.into());
        }

        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());

        tracing::debug!(
            "Saved session {} ({} batches) to {:?}",
            session.id,
            session.recording_history.len(),
            path
        );
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
        validate_id(id)?;
        let path = self.session_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.sessions.write().remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        for id in ids {
            self.delete(&id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::schema::{RecordingEvent, TabEventBatch};
    use serde_json::json;

    fn session_with(tabs: &[(u64, usize)]) -> RecordingSession {
        RecordingSession::new(
            tabs.iter()
                .map(|(tab, n)| {
                    let events = (0..*n)
                        .map(|i| RecordingEvent::new(json!({ "timestamp": i })))
                        .collect();
                    TabEventBatch::new(*tab, events)
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_session_crud() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path().join("sessions")).unwrap();

        let session = session_with(&[(1, 5), (2, 3)]);

        // Create
        let id = store.put(&session).await.unwrap();
        assert_eq!(id, session.id);
        assert!(store.dir().join(format!("{}.json", id)).exists());

        // Read
        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded, session);

        // Duplicate add is rejected
        let err = store.put(&session).await.unwrap_err();
        assert!(matches!(err, TabreelError::DuplicateSession(_)));

        // Delete
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_loads_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(&[(7, 2)]);
        {
            let store = JsonSessionStore::open(dir.path()).unwrap();
            store.put(&session).await.unwrap();
        }
        std::fs::write(dir.path().join("garbage.json"), "{not json").unwrap();

        let store = JsonSessionStore::open(dir.path()).unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].recording_history[0].tab_id, 7);
        assert_eq!(all[0].recording_history[0].events.len(), 2);
    }

    #[tokio::test]
    async fn test_list_is_chronological_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();

        let mut late = session_with(&[(1, 1)]);
        late.timestamp = 2_000;
        let mut early = session_with(&[(2, 1)]);
        early.timestamp = 1_000;
        store.put(&late).await.unwrap();
        store.put(&early).await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![early.id.clone(), late.id.clone()]);

        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();
        let session = session_with(&[(1, 2)]);

        // A directory in the way makes the final rename fail
        let target = dir.path().join(format!("{}.json", session.id));
        std::fs::create_dir(&target).unwrap();

        assert!(store.put(&session).await.is_err());
        assert!(!dir.path().join(format!("{}.json.tmp", session.id)).exists());
        assert!(store.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();
        let mut session = session_with(&[(1, 1)]);
        session.id = "../escape".to_string();
        assert!(store.put(&session).await.is_err());
    }
}
