// src/handlers/socket_handler.rs
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing;

use crate::{models::messages::ServerEvent, services::connection_registry::ConnectionHandle, state::AppState};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel();
    let connection_id = handle.id();
    tracing::info!("Socket {} connected", connection_id);

    // Sole writer: everything bound for this socket goes through the channel
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Could not encode {} for socket {}: {}", event.name(), connection_id, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(e) = state.gateway.handle_text(&handle, &text).await {
                    tracing::warn!("Rejected event on socket {}: {}", connection_id, e);
                    let _ = handle.send(ServerEvent::error(e.to_string()));
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Socket {} read error: {}", connection_id, e);
                break;
            }
        }
    }

    state.gateway.handle_disconnect(connection_id).await;
    writer.abort();
    tracing::info!("Socket {} closed", connection_id);
}
