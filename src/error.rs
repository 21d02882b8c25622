use crate::protocol::TabId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabreelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tab {tab_id} unreachable: {reason}")]
    Unreachable { tab_id: TabId, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Replay error: {0}")]
    Replay(String),

    #[error("Recording coordinator is not running")]
    CoordinatorClosed,
}

impl TabreelError {
    pub fn unreachable(tab_id: TabId, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            tab_id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TabreelError>;
