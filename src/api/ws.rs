//! WebSocket push of coordinator notices.
//!
//! Lets the control UI follow recording state, tab switches and saved
//! sessions without polling.

use crate::recording::RecordingNotice;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// WebSocket upgrade handler for `/api/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the flag so no change slips between the two
    let mut rx = state.coordinator.subscribe();
    let initial = RecordingNotice::StateChanged {
        is_recording: state.coordinator.is_recording(),
    };

    let send_task = tokio::spawn(async move {
        if send_notice(&mut sender, &initial).await.is_err() {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(notice) => {
                    if send_notice(&mut sender, &notice).await.is_err() {
                        break; // Client disconnected
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket client lagged, skipped {} notices", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Axum answers pings itself; only watch for the close.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}

async fn send_notice<S>(sender: &mut S, notice: &RecordingNotice) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(notice).map_err(|_| ())?;
    sender.send(Message::Text(json)).await.map_err(|_| ())
}
