use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default port of the local HTTP API.
pub const DEFAULT_API_PORT: u16 = 38473;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local HTTP API
    #[serde(default)]
    pub server: ServerConfig,

    /// Session persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Coordinator ↔ tab message delivery
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port on 127.0.0.1 for the HTTP API
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional API key (X-API-Key header); None = no auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_API_PORT,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per session
    #[default]
    File,
    /// Kept in memory, lost on restart
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Sessions directory (default: ~/.tabreel/sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Directory holding session files.
    pub fn sessions_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tabreel")
                .join("sessions")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// How long a message to a tab may wait for its reply before the tab is
    /// treated as unreachable
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_filter() -> String {
    "info".to_string()
}
