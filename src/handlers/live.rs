use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::AppState;
use crate::events::DispatchEvent;

/// Stream dispatch events to a WebSocket client as JSON text frames
pub async fn order_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

async fn forward_events(mut socket: WebSocket, mut events: broadcast::Receiver<DispatchEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "WebSocket subscriber lagging, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode dispatch event");
                continue;
            }
        };

        if socket.send(Message::Text(text.into())).await.is_err() {
            tracing::debug!("WebSocket subscriber disconnected");
            break;
        }
    }
}
