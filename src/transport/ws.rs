//! WebSocket client transport
//!
//! Carries envelopes as JSON text frames to the gateway's `/ws` bridge. The
//! bridge assigns the socket's reply address and announces it in the first
//! frame; the endpoint adopts it.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::envelope::{Envelope, EnvelopeKind};
use super::{Connection, Endpoint};
use crate::error::{PoolError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);

pub struct WsEndpoint {
    reply_to: String,
    outbound: mpsc::Sender<Envelope>,
}

#[async_trait]
impl Endpoint for WsEndpoint {
    fn reply_to(&self) -> &str {
        &self.reply_to
    }

    async fn publish(&self, envelope: Envelope) -> Result<()> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| PoolError::Transport("WebSocket connection closed".to_string()))
    }
}

/// Dial the gateway and start pumping frames. The returned connection's
/// reply stream ends when the socket does.
pub async fn connect(url: &str, queue_capacity: usize) -> Result<Connection> {
    info!("Connecting to WebSocket: {}", url);

    let (mut ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| PoolError::Transport("WebSocket connection timeout".to_string()))?
        .map_err(PoolError::WebSocket)?;

    let reply_to = timeout(CONNECT_TIMEOUT, await_attachment(&mut ws_stream))
        .await
        .map_err(|_| PoolError::Transport("gateway never assigned a reply address".to_string()))??;

    info!(reply_to = %reply_to, "WebSocket connected");

    let capacity = queue_capacity.max(1);
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);

    tokio::spawn(async move {
        if let Err(e) = pump(ws_stream, outbound_rx, inbound_tx).await {
            warn!(error = %e, "WebSocket session ended with error");
        }
    });

    Ok(Connection {
        endpoint: Arc::new(WsEndpoint {
            reply_to,
            outbound: outbound_tx,
        }),
        inbound: inbound_rx,
    })
}

/// Read frames until the gateway's `attached` announcement
async fn await_attachment(ws_stream: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Result<String> {
    while let Some(msg) = ws_stream.next().await {
        match msg? {
            Message::Text(text) => {
                let envelope: Envelope = serde_json::from_str(&text)?;
                if envelope.kind == EnvelopeKind::Attached {
                    return Ok(envelope.reply_to);
                }
                debug!(operation = %envelope.operation, "frame before attachment, ignoring");
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(PoolError::Transport(
        "gateway closed the socket before assigning a reply address".to_string(),
    ))
}

async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::Receiver<Envelope>,
    inbound: mpsc::Sender<Envelope>,
) -> Result<()> {
    let (mut write, mut read) = ws_stream.split();
    let mut ping_interval = interval(PING_INTERVAL);

    loop {
        tokio::select! {
            request = outbound.recv() => {
                let Some(envelope) = request else {
                    // every endpoint handle is gone
                    let _ = write.send(Message::Close(None)).await;
                    break;
                };
                let text = serde_json::to_string(&envelope)?;
                write.send(Message::Text(text)).await?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                if inbound.send(envelope).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "discarding malformed frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Received close frame");
                        break;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                    _ => {}
                }
            }
            _ = ping_interval.tick() => {
                write.send(Message::Ping(vec![])).await?;
                debug!("Sent ping");
            }
        }
    }

    Ok(())
}
