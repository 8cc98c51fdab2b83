//! WebSocket handler for live reload.
//!
//! Registers each connection with the hub, forwards hub envelopes to the
//! socket and relays incoming frames back through the hub.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::hub::{BroadcastHub, ClientConnection};
use crate::state::AppState;

/// Handle WebSocket upgrade on any path.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, hub: Arc<BroadcastHub>) {
    let ClientConnection { id, mut receiver } = hub.connect();

    loop {
        tokio::select! {
            // Forward hub envelopes to the client
            outgoing = receiver.recv() => {
                let Some(envelope) = outgoing else {
                    // Hub dropped the queue (server stopping)
                    break;
                };
                if socket.send(Message::Text(envelope.to_string().into())).await.is_err() {
                    break;
                }
            }
            // Relay client frames to everyone
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        hub.on_client_message(id, text.as_str());
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        hub.on_client_message(id, &String::from_utf8_lossy(&bytes));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::info!(client = %id, error = %e, "Client connection error");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(id);
    let _ = socket.send(Message::Close(None)).await;
}
