//! WebSocket endpoint for the chat protocol.
//!
//! One session per connection. Inbound frames are request envelopes
//! dispatched to the session; outbound envelopes flow through an mpsc
//! queue drained here, so response emitters never block on the socket.

use crate::session::ChatSession;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use nbintel_protocol::RequestEnvelope;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let session = ChatSession::new(state.service.clone(), outbound_tx);

    loop {
        tokio::select! {
            Some(envelope) = outbound_rx.recv() => {
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => warn!(error = %error, "failed to serialize response envelope"),
                }
            }

            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<RequestEnvelope>(&text) {
                            Ok(envelope) => session.handle_message(envelope),
                            Err(error) => warn!(error = %error, "invalid request envelope"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(error)) => {
                        warn!(error = %error, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!("websocket connection closed");
}
