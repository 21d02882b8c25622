use crate::config::schema::{AppConfig, StorageBackend};
use crate::error::{Result, TabreelError};

/// Validate a loaded configuration before the daemon starts
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.server.port == 0 {
        return Err(TabreelError::Validation(
            "server.port cannot be 0".to_string(),
        ));
    }

    if let Some(key) = &config.server.api_key {
        if key.trim().is_empty() {
            return Err(TabreelError::Validation(
                "server.api_key cannot be blank; remove it to disable auth".to_string(),
            ));
        }
    }

    if config.messaging.timeout_ms == 0 {
        return Err(TabreelError::Validation(
            "messaging.timeout_ms must be greater than 0".to_string(),
        ));
    }

    if config.logging.filter.trim().is_empty() {
        return Err(TabreelError::Validation(
            "logging.filter cannot be empty".to_string(),
        ));
    }

    // Validate the sessions directory path format (don't check existence, it will be created)
    if config.storage.backend == StorageBackend::File {
        if let Some(dir) = &config.storage.dir {
            if dir.as_os_str().is_empty() {
                return Err(TabreelError::Validation(
                    "storage.dir cannot be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}
