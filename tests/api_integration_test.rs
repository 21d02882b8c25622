//! Integration tests for the local HTTP API.
//! Tests recording control through host tab signals, stored sessions, replay
//! and API key auth.

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tabreel_lib::api::{app, ApiState};
use tabreel_lib::config::AppConfig;
use tabreel_lib::recording::RecordingSession;
use tabreel_lib::state::AppState;
use tabreel_lib::store::MemorySessionStore;
use tower::ServiceExt;

fn make_state() -> ApiState {
    Arc::new(AppState::with_store(
        AppConfig::default(),
        Arc::new(MemorySessionStore::new()),
    ))
}

fn json_body(val: &Value) -> axum::body::Body {
    axum::body::Body::from(serde_json::to_vec(val).unwrap())
}

fn get(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Option<Value>) -> axum::http::Request<axum::body::Body> {
    let builder = axum::http::Request::builder().method("POST").uri(uri);
    match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(json_body(&v))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    }
}

fn delete(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

async fn call(
    app: &axum::Router,
    req: axum::http::Request<axum::body::Body>,
) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn events(start: u64, n: u64) -> Value {
    Value::Array(
        (0..n)
            .map(|i| json!({ "type": 3, "timestamp": start + i * 100 }))
            .collect(),
    )
}

/// Record `n1` events on tab 1, switch to tab 2, record `n2` events, stop.
/// Returns the saved session id.
async fn record_two_tabs(app: &axum::Router, n1: u64, n2: u64) -> String {
    assert_eq!(call(app, post("/api/tabs/1", None)).await.0, StatusCode::CREATED);
    assert_eq!(call(app, post("/api/tabs/2", None)).await.0, StatusCode::CREATED);
    assert_eq!(
        call(app, post("/api/tabs/1/activate", None)).await.0,
        StatusCode::ACCEPTED
    );

    let (status, started) = call(app, post("/api/recording/start", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["isRecording"], true);

    let (_, accepted) = call(app, post("/api/tabs/1/events", Some(events(1_000, n1)))).await;
    assert_eq!(accepted["accepted"], n1);

    call(app, post("/api/tabs/2/activate", None)).await;
    // The state query is answered after the activation was handled
    let (_, state) = call(app, get("/api/recording/state")).await;
    assert_eq!(state["currentTabId"], 2);
    assert_eq!(state["previousTabId"], 1);

    let (_, accepted) = call(app, post("/api/tabs/2/events", Some(events(5_000, n2)))).await;
    assert_eq!(accepted["accepted"], n2);

    let (status, stopped) = call(app, post("/api/recording/stop", None)).await;
    assert_eq!(status, StatusCode::OK);
    stopped["sessionId"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_health() {
    let app = app(make_state(), None);
    let res = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

// ---------------------------------------------------------------------------
// Recording control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_recording_idle_by_default() {
    let app = app(make_state(), None);
    let (status, json) = call(&app, get("/api/recording")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "isRecording": false }));

    let (_, state) = call(&app, get("/api/recording/state")).await;
    assert_eq!(state["isRecording"], false);
    assert_eq!(state["pendingBatches"], 0);
}

#[tokio::test]
async fn test_api_stop_without_history_saves_nothing() {
    let app = app(make_state(), None);
    let (status, json) = call(&app, post("/api/recording/stop", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessionId"], Value::Null);

    let (_, sessions) = call(&app, get("/api/sessions")).await;
    assert_eq!(sessions, json!([]));
}

#[tokio::test]
async fn test_api_two_tab_recording_is_saved_as_one_session() {
    let app = app(make_state(), None);
    let id = record_two_tabs(&app, 5, 3).await;

    let (_, recording) = call(&app, get("/api/recording")).await;
    assert_eq!(recording["isRecording"], false);

    let (status, session) = call(&app, get(&format!("/api/sessions/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    let session: RecordingSession = serde_json::from_value(session).unwrap();
    let shape: Vec<(u64, usize)> = session
        .recording_history
        .iter()
        .map(|b| (b.tab_id, b.events.len()))
        .collect();
    assert_eq!(shape, vec![(1, 5), (2, 3)]);

    let (_, sessions) = call(&app, get("/api/sessions")).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["id"], id.as_str());
    assert_eq!(sessions[0]["tabCount"], 2);
    assert_eq!(sessions[0]["totalEvents"], 8);
}

#[tokio::test]
async fn test_api_events_for_unknown_tab_404() {
    let app = app(make_state(), None);
    let (status, json) = call(&app, post("/api/tabs/7/events", Some(events(0, 1)))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "tab_not_open");
}

#[tokio::test]
async fn test_api_tab_open_close() {
    let app = app(make_state(), None);
    assert_eq!(call(&app, post("/api/tabs/3", None)).await.0, StatusCode::CREATED);
    assert_eq!(call(&app, post("/api/tabs/3", None)).await.0, StatusCode::OK);

    let (_, tabs) = call(&app, get("/api/tabs")).await;
    assert_eq!(tabs.as_array().unwrap().len(), 1);
    assert_eq!(tabs[0]["tab_id"], 3);
    assert_eq!(tabs[0]["capturing"], false);

    assert_eq!(call(&app, delete("/api/tabs/3")).await.0, StatusCode::NO_CONTENT);
    assert_eq!(call(&app, delete("/api/tabs/3")).await.0, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Protocol messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_message_is_recording() {
    let app = app(make_state(), None);
    let (status, reply) = call(
        &app,
        post("/api/messages", Some(json!({ "message": { "type": "is-recording" } }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        reply,
        json!({ "type": "is-recording", "data": { "isRecording": false } })
    );
}

#[tokio::test]
async fn test_api_message_recording_data_requires_sender() {
    let app = app(make_state(), None);
    let msg = json!({ "message": { "type": "recording-data", "data": { "events": [] } } });
    let (status, json) = call(&app, post("/api/messages", Some(msg))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_api_message_trailing_batch_is_saved() {
    let app = app(make_state(), None);
    let msg = json!({
        "sender": 4,
        "message": { "type": "recording-data", "data": { "events": events(10, 2) } }
    });
    let (status, reply) = call(&app, post("/api/messages", Some(msg))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({ "type": "ack" }));

    // Barrier: the batch has been handled once the state query returns
    call(&app, get("/api/recording/state")).await;
    let (_, sessions) = call(&app, get("/api/sessions")).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["totalEvents"], 2);
}

// ---------------------------------------------------------------------------
// Stored sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_get_session_not_found() {
    let app = app(make_state(), None);
    let (status, json) = call(&app, get("/api/sessions/nonexistent-id")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "session_not_found");
}

#[tokio::test]
async fn test_api_delete_session() {
    let app = app(make_state(), None);
    let id = record_two_tabs(&app, 2, 2).await;

    let uri = format!("/api/sessions/{}", id);
    assert_eq!(call(&app, delete(&uri)).await.0, StatusCode::NO_CONTENT);
    assert_eq!(call(&app, delete(&uri)).await.0, StatusCode::NOT_FOUND);
    assert_eq!(call(&app, get(&uri)).await.0, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_replay_requires_loaded_session() {
    let app = app(make_state(), None);
    let (status, json) = call(&app, get("/api/replay")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "replay_not_loaded");

    let (status, _) = call(&app, post("/api/replay/load/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_replay_load_seek_speed() {
    let app = app(make_state(), None);
    let id = record_two_tabs(&app, 3, 2).await;

    let (status, loaded) = call(&app, post(&format!("/api/replay/load/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["sessionId"], id.as_str());
    assert_eq!(loaded["eventsTotal"], 5);
    // First event at 1000, last at 5100
    assert_eq!(loaded["totalTime"], 4_100);
    assert_eq!(loaded["isPlaying"], false);

    let (_, seeked) = call(&app, post("/api/replay/seek", Some(json!({ "time": 150 })))).await;
    assert_eq!(seeked["currentTime"], 150);
    assert_eq!(seeked["eventsDue"], 2);

    let (_, due) = call(&app, get("/api/replay/events")).await;
    assert_eq!(due.as_array().unwrap().len(), 2);

    let (status, _) = call(&app, post("/api/replay/speed", Some(json!({ "speed": 3.0 })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, faster) = call(&app, post("/api/replay/speed", Some(json!({ "speed": 2.0 })))).await;
    assert_eq!(faster["speed"], 2.0);

    // Deleting the loaded session unloads the replay
    call(&app, delete(&format!("/api/sessions/{}", id))).await;
    assert_eq!(call(&app, get("/api/replay")).await.0, StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// API key auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_api_auth_health_open() {
    let app = app(make_state(), Some("secret".to_string()));
    let res = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_auth_required() {
    let app = app(make_state(), Some("secret".to_string()));
    assert_eq!(
        call(&app, get("/api/recording")).await.0,
        StatusCode::UNAUTHORIZED
    );

    let req = axum::http::Request::builder()
        .uri("/api/recording")
        .header("X-API-Key", "secret")
        .body(axum::body::Body::empty())
        .unwrap();
    assert_eq!(call(&app, req).await.0, StatusCode::OK);
}
