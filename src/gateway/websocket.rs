//! `/ws`: WebSocket clients bridged onto the message bus
//!
//! Each socket gets its own bus address, announced to the client in an
//! `attached` frame. Inbound requests have their reply target rewritten to
//! that address before they reach the service queue, so replies find their
//! way back down the same socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt, Sink};
use tracing::{debug, error, info, warn};

use super::state::GatewayState;
use crate::error::{PoolError, Result};
use crate::transport::{client_address, Envelope, EnvelopeKind, MessageBus, SERVICE_ADDRESS};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let address = client_address();
    let mut replies = state.bus.declare(&address);
    state.metrics.inc_ws_connections();
    info!(address = %address, "WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = announce(&mut sender, &address).await {
        warn!(address = %address, error = %e, "could not announce reply address");
        state.bus.remove(&address);
        return;
    }

    // forward bus replies to this socket
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = replies.recv().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize reply envelope: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => forward_request(&state.bus, &address, &text).await,
            Message::Close(_) => {
                break;
            }
            _ => {}
        }
    }

    state.bus.remove(&address);
    send_task.abort();

    info!(address = %address, "WebSocket connection closed");
}

async fn announce<S>(sender: &mut S, address: &str) -> Result<()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let frame = serde_json::to_string(&Envelope::attached(address))?;
    sender
        .send(Message::Text(frame))
        .await
        .map_err(|e| PoolError::Transport(e.to_string()))
}

async fn forward_request(bus: &MessageBus, address: &str, text: &str) {
    let mut envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "discarding malformed frame");
            return;
        }
    };

    if envelope.kind != EnvelopeKind::Request {
        debug!(operation = %envelope.operation, "ignoring non-request frame");
        return;
    }

    envelope.reply_to = address.to_string();
    if let Err(e) = bus.publish(SERVICE_ADDRESS, envelope).await {
        warn!(error = %e, "could not forward request to storage service");
    }
}
