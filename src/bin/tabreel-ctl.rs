//! tabreel control CLI: start/stop recording and manage stored sessions.
//! Talks to the tabreel HTTP API over localhost.
//!
//! Usage: tabreel-ctl <command>  (set TABREEL_API_PORT or --port if not 38473)

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tabreel_lib::config::DEFAULT_API_PORT;
use tabreel_lib::protocol::{IsRecordingResponse, StopResponse};
use tabreel_lib::recording::SessionSummary;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabreel-ctl")]
#[command(about = "Control the tabreel cross-tab recorder", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API port of the running daemon
    #[arg(short, long, global = true, env = "TABREEL_API_PORT", default_value_t = DEFAULT_API_PORT)]
    port: u16,

    /// API key, if the daemon requires one
    #[arg(long, global = true, env = "TABREEL_API_KEY")]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether recording is on
    Status,
    /// Start recording on the active tab
    Start,
    /// Stop recording and save the session
    Stop,
    /// Save accumulated history now (retry after a failed stop)
    Flush,
    /// List stored sessions, newest first
    Sessions,
    /// Print a stored session as JSON
    Show {
        /// Session id
        id: String,
    },
    /// Delete a stored session
    Delete {
        /// Session id
        id: String,
    },
    /// Delete every stored session
    Clear,
}

struct ApiClient {
    client: Client,
    base: String,
    api_key: Option<String>,
}

impl ApiClient {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base, path));
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn send(&self, method: Method, path: &str) -> anyhow::Result<reqwest::Response> {
        tracing::debug!("{} {}{}", method, self.base, path);
        let resp = self
            .request(method.clone(), path)
            .send()
            .await
            .with_context(|| format!("tabreel API not reachable at {}", self.base))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(api_failure(&method, path, status, &body));
        }
        tracing::debug!("{} {} -> {}", method, path, resp.status().as_u16());
        Ok(resp)
    }
}

/// Error for a non-success response, preferring the API's `message` field.
fn api_failure(method: &Method, path: &str, status: StatusCode, body: &str) -> anyhow::Error {
    tracing::warn!("{} {} -> {}: {}", method, path, status.as_u16(), body);
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    anyhow::anyhow!("HTTP {}: {}", status, message)
}

async fn report_saved(api: &ApiClient, path: &str) -> anyhow::Result<()> {
    let resp: StopResponse = api.send(Method::POST, path).await?.json().await?;
    match resp.session_id {
        Some(id) => println!("session saved: {}", id),
        None => println!("nothing recorded"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Quiet unless RUST_LOG asks for request tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let api = ApiClient {
        client: Client::new(),
        base: format!("http://127.0.0.1:{}", cli.port),
        api_key: cli.api_key,
    };

    match cli.command {
        Commands::Status => {
            let status: IsRecordingResponse = api.send(Method::GET, "/api/recording").await?.json().await?;
            println!("{}", if status.is_recording { "recording" } else { "idle" });
        }
        Commands::Start => {
            api.send(Method::POST, "/api/recording/start").await?;
            println!("recording started");
        }
        Commands::Stop => report_saved(&api, "/api/recording/stop").await?,
        Commands::Flush => report_saved(&api, "/api/recording/flush").await?,
        Commands::Sessions => {
            let sessions: Vec<SessionSummary> = api.send(Method::GET, "/api/sessions").await?.json().await?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            for s in sessions {
                println!(
                    "{}  {}  {} tabs, {} events",
                    s.id, s.timestamp, s.tab_count, s.total_events
                );
            }
        }
        Commands::Show { id } => {
            let resp = api
                .request(Method::GET, &format!("/api/sessions/{}", id))
                .send()
                .await
                .with_context(|| format!("tabreel API not reachable at {}", api.base))?;
            if resp.status() == StatusCode::NOT_FOUND {
                bail!("session {} not found", id);
            }
            let session: Value = resp.error_for_status()?.json().await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::Delete { id } => {
            api.send(Method::DELETE, &format!("/api/sessions/{}", id)).await?;
            println!("deleted {}", id);
        }
        Commands::Clear => {
            api.send(Method::DELETE, "/api/sessions").await?;
            println!("all sessions deleted");
        }
    }

    Ok(())
}
