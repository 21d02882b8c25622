//! Local HTTP API: recording control, host tab signals, stored sessions and
//! replay.

pub mod ws;

use crate::error::TabreelError;
use crate::protocol::{Envelope, IsRecordingResponse, Reply, StopResponse, TabId};
use crate::recording::{CoordinatorSnapshot, RecordingEvent, RecordingSession, SessionSummary};
use crate::replay::{ReplayStatus, Replayer};
use crate::state::{AppState, TabInfo};
use axum::{
    extract::{Path as AxumPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub type ApiState = Arc<AppState>;

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// API key authentication middleware.
/// Skips authentication for GET /api/health so clients can probe the server.
async fn api_key_auth(
    State(expected_key): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(k) if k == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Log every API call with timing and outcome.
async fn request_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let t0 = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = t0.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::warn!("{} {} -> {} ({}ms)", method, path, status.as_u16(), duration_ms);
    } else {
        tracing::debug!("{} {} -> {} ({}ms)", method, path, status.as_u16(), duration_ms);
    }
    response
}

/// Map a crate error to an HTTP status and JSON error body.
fn api_error(e: TabreelError) -> (StatusCode, String) {
    let (status, kind) = match &e {
        TabreelError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
        TabreelError::Validation(_) | TabreelError::Protocol(_) => {
            (StatusCode::BAD_REQUEST, "invalid_request")
        }
        TabreelError::Replay(_) => (StatusCode::CONFLICT, "replay_error"),
        TabreelError::Unreachable { .. } => (StatusCode::BAD_GATEWAY, "tab_unreachable"),
        TabreelError::CoordinatorClosed => (StatusCode::SERVICE_UNAVAILABLE, "coordinator_closed"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    (
        status,
        serde_json::json!({ "error": kind, "message": e.to_string() }).to_string(),
    )
}

fn tab_not_open(tab_id: TabId) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        serde_json::json!({
            "error": "tab_not_open",
            "message": format!("Tab {} is not open", tab_id),
            "tab_id": tab_id,
        })
        .to_string(),
    )
}

fn no_replay_loaded() -> (StatusCode, String) {
    (
        StatusCode::CONFLICT,
        serde_json::json!({
            "error": "replay_not_loaded",
            "message": "No session is loaded for replay",
        })
        .to_string(),
    )
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Recording control
        .route("/api/recording", get(get_recording))
        .route("/api/recording/state", get(get_recording_state))
        .route("/api/recording/start", post(start_recording))
        .route("/api/recording/stop", post(stop_recording))
        .route("/api/recording/flush", post(flush_recording))
        .route("/api/messages", post(post_message))
        // Host tab signals
        .route("/api/tabs", get(list_tabs))
        .route("/api/tabs/:id", post(open_tab).delete(close_tab))
        .route("/api/tabs/:id/activate", post(activate_tab))
        .route("/api/tabs/:id/events", post(emit_events))
        // Stored sessions
        .route("/api/sessions", get(list_sessions).delete(clear_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        // Replay
        .route("/api/replay", get(get_replay))
        .route("/api/replay/events", get(get_replay_events))
        .route("/api/replay/load/:id", post(load_replay))
        .route("/api/replay/play", post(play_replay))
        .route("/api/replay/pause", post(pause_replay))
        .route("/api/replay/seek", post(seek_replay))
        .route("/api/replay/speed", post(set_replay_speed))
        // WebSocket (real-time notices)
        .route("/api/ws", get(ws::ws_handler))
        // Utility
        .route("/api/health", get(health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// Recording control
// ---------------------------------------------------------------------------

async fn get_recording(State(state): State<ApiState>) -> Json<IsRecordingResponse> {
    Json(IsRecordingResponse {
        is_recording: state.coordinator.is_recording(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingStateResponse {
    #[serde(flatten)]
    state: crate::recording::RecordingState,
    pending_batches: usize,
    pending_events: usize,
    pending_stops: usize,
}

impl From<CoordinatorSnapshot> for RecordingStateResponse {
    fn from(snapshot: CoordinatorSnapshot) -> Self {
        Self {
            state: snapshot.state,
            pending_batches: snapshot.history.len(),
            pending_events: snapshot.history.iter().map(|b| b.events.len()).sum(),
            pending_stops: snapshot.pending_stops,
        }
    }
}

async fn get_recording_state(
    State(state): State<ApiState>,
) -> ApiResult<Json<RecordingStateResponse>> {
    let snapshot = state.coordinator.snapshot().await.map_err(api_error)?;
    Ok(Json(snapshot.into()))
}

async fn start_recording(State(state): State<ApiState>) -> ApiResult<Json<IsRecordingResponse>> {
    state.coordinator.start().await.map_err(api_error)?;
    Ok(Json(IsRecordingResponse {
        is_recording: state.coordinator.is_recording(),
    }))
}

async fn stop_recording(State(state): State<ApiState>) -> ApiResult<Json<StopResponse>> {
    let session_id = state.coordinator.stop().await.map_err(api_error)?;
    Ok(Json(StopResponse { session_id }))
}

async fn flush_recording(State(state): State<ApiState>) -> ApiResult<Json<StopResponse>> {
    let session_id = state.coordinator.flush().await.map_err(api_error)?;
    Ok(Json(StopResponse { session_id }))
}

async fn post_message(
    State(state): State<ApiState>,
    Json(envelope): Json<Envelope>,
) -> ApiResult<Json<Reply>> {
    tracing::debug!("Dispatching {} from {:?}", envelope.message.message_type(), envelope.sender);
    let reply = state.coordinator.dispatch(envelope).await.map_err(api_error)?;
    Ok(Json(reply))
}

// ---------------------------------------------------------------------------
// Host tab signals
// ---------------------------------------------------------------------------

async fn list_tabs(State(state): State<ApiState>) -> Json<Vec<TabInfo>> {
    Json(state.tab_infos())
}

async fn open_tab(State(state): State<ApiState>, AxumPath(tab_id): AxumPath<TabId>) -> StatusCode {
    if state.open_tab(tab_id) {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

async fn close_tab(State(state): State<ApiState>, AxumPath(tab_id): AxumPath<TabId>) -> StatusCode {
    if state.close_tab(tab_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn activate_tab(
    State(state): State<ApiState>,
    AxumPath(tab_id): AxumPath<TabId>,
) -> ApiResult<StatusCode> {
    state.activate_tab(tab_id).map_err(api_error)?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmitResponse {
    pub accepted: usize,
}

async fn emit_events(
    State(state): State<ApiState>,
    AxumPath(tab_id): AxumPath<TabId>,
    Json(events): Json<Vec<RecordingEvent>>,
) -> ApiResult<Json<EmitResponse>> {
    let accepted = state
        .emit_events(tab_id, events)
        .ok_or_else(|| tab_not_open(tab_id))?;
    Ok(Json(EmitResponse { accepted }))
}

// ---------------------------------------------------------------------------
// Stored sessions
// ---------------------------------------------------------------------------

async fn list_sessions(State(state): State<ApiState>) -> ApiResult<Json<Vec<SessionSummary>>> {
    let sessions = state.store.list().await.map_err(api_error)?;
    // Newest first, as the replay UI lists them
    let summaries = sessions.iter().rev().map(|s| s.summary()).collect();
    Ok(Json(summaries))
}

async fn get_session(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<RecordingSession>> {
    state
        .store
        .get(&id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(TabreelError::SessionNotFound(id)))
}

async fn delete_session(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    if state.store.get(&id).await.map_err(api_error)?.is_none() {
        return Err(api_error(TabreelError::SessionNotFound(id)));
    }
    state.store.delete(&id).await.map_err(api_error)?;
    unload_replay_of(&state, &id);
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_sessions(State(state): State<ApiState>) -> ApiResult<StatusCode> {
    state.store.clear().await.map_err(api_error)?;
    *state.replayer.lock() = None;
    Ok(StatusCode::NO_CONTENT)
}

fn unload_replay_of(state: &AppState, session_id: &str) {
    let mut replayer = state.replayer.lock();
    if replayer.as_ref().is_some_and(|r| r.session_id() == session_id) {
        *replayer = None;
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Run `f` on the loaded replayer and return its status afterwards.
fn with_replayer<F>(state: &AppState, f: F) -> ApiResult<Json<ReplayStatus>>
where
    F: FnOnce(&mut Replayer) -> Result<(), TabreelError>,
{
    let mut guard = state.replayer.lock();
    let replayer = guard.as_mut().ok_or_else(no_replay_loaded)?;
    f(replayer).map_err(api_error)?;
    Ok(Json(replayer.status()))
}

async fn get_replay(State(state): State<ApiState>) -> ApiResult<Json<ReplayStatus>> {
    with_replayer(&state, |_| Ok(()))
}

async fn get_replay_events(State(state): State<ApiState>) -> ApiResult<Json<Vec<RecordingEvent>>> {
    let guard = state.replayer.lock();
    let replayer = guard.as_ref().ok_or_else(no_replay_loaded)?;
    Ok(Json(replayer.due_events().into_iter().cloned().collect()))
}

async fn load_replay(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<ReplayStatus>> {
    let session = state
        .store
        .get(&id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(TabreelError::SessionNotFound(id)))?;
    let replayer = Replayer::new(&session).map_err(api_error)?;
    let status = replayer.status();
    *state.replayer.lock() = Some(replayer);
    tracing::info!(
        "Loaded session {} for replay ({} events, {}ms)",
        status.session_id,
        status.events_total,
        status.total_time
    );
    Ok(Json(status))
}

async fn play_replay(State(state): State<ApiState>) -> ApiResult<Json<ReplayStatus>> {
    with_replayer(&state, |r| {
        r.play();
        Ok(())
    })
}

async fn pause_replay(State(state): State<ApiState>) -> ApiResult<Json<ReplayStatus>> {
    with_replayer(&state, |r| {
        r.pause();
        Ok(())
    })
}

#[derive(Debug, Deserialize)]
struct SeekRequest {
    time: u64,
}

async fn seek_replay(
    State(state): State<ApiState>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<Json<ReplayStatus>> {
    with_replayer(&state, |r| {
        r.seek(req.time);
        Ok(())
    })
}

#[derive(Debug, Deserialize)]
struct SpeedRequest {
    speed: f64,
}

async fn set_replay_speed(
    State(state): State<ApiState>,
    Json(req): Json<SpeedRequest>,
) -> ApiResult<Json<ReplayStatus>> {
    with_replayer(&state, |r| r.set_speed(req.speed))
}

// ---------------------------------------------------------------------------
// App + server
// ---------------------------------------------------------------------------

/// Router with the full middleware stack.
pub fn app(state: ApiState, api_key: Option<String>) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    let base_router = router(state);
    if let Some(key) = api_key {
        base_router.route_layer(middleware::from_fn_with_state(key, api_key_auth))
    } else {
        base_router
    }
    .layer(middleware::from_fn(request_log_middleware))
    .layer(ConcurrencyLimitLayer::new(32))
    .layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static("x-api-key"),
            ]),
    )
}

pub async fn run_server(state: ApiState, port: u16, api_key: Option<String>) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| format!("Failed to bind API port {}: {}", port, e))?;
    let app = app(state, api_key);
    tracing::info!("tabreel API listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
