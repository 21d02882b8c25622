use crate::config::schema::AppConfig;
use crate::error::{Result, TabreelError};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration file location
pub const CONFIG_PATH_ENV: &str = "TABREEL_CONFIG";

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    let config_dir = if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|p| p.join("com.tabreel.app"))
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        dirs::config_dir()
            .map(|p| p.join("tabreel"))
            .unwrap_or_else(|| PathBuf::from("."))
    };

    config_dir.join("config.toml")
}

/// Load configuration from the default location, creating it if missing
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path())
}

/// Load configuration from `config_path`, writing defaults there if the file
/// does not exist
pub fn load_config_from(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        tracing::info!(
            "Config file not found at {:?}, creating default",
            config_path
        );
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        TabreelError::Config(format!(
            "Failed to read config from {:?}: {}",
            config_path, e
        ))
    })?;

    let config: AppConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", config_path);
    Ok(config)
}

/// Save configuration to `config_path`
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            TabreelError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(config_path, content).map_err(|e| {
        TabreelError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::info!("Saved config to {:?}", config_path);
    Ok(())
}
