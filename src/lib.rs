pub mod api;
pub mod config;
pub mod error;
pub mod host;
pub mod protocol;
pub mod recording;
pub mod replay;
pub mod state;
pub mod store;

use state::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` wins over the configured filter.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run the recorder daemon until the API server exits.
pub async fn run() -> anyhow::Result<()> {
    // Load configuration (never overwrite an existing file on failure)
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            init_tracing("info");
            tracing::error!("Failed to load config: {}. Using in-memory defaults (not saving).", e);
            config::AppConfig::default()
        }
    };
    init_tracing(&config.logging.filter);
    config::validate_config(&config)?;

    let port = config.server.port;
    let api_key = config.server.api_key.clone();

    // Fresh coordinator state on every start; only stored sessions survive
    let state = Arc::new(AppState::new(config)?);

    api::run_server(state, port, api_key)
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))
}
