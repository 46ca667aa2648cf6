//! Correlation-token RPC over a message bus
//!
//! Requests go to one shared service queue; each client owns a private reply
//! queue and matches replies to outstanding calls by correlation id.

pub mod bus;
pub mod client;
pub mod envelope;
pub mod rpc;
pub mod server;
pub mod ws;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;

pub use bus::{client_address, BusEndpoint, MessageBus, CLIENT_ADDRESS_PREFIX, SERVICE_ADDRESS};
pub use client::StorageClient;
pub use envelope::{Envelope, EnvelopeKind};
pub use rpc::RpcClient;
pub use server::RpcServer;
pub use ws::WsEndpoint;

/// Outbound half of a client connection
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Address replies to this client are routed to
    fn reply_to(&self) -> &str;

    /// Send a request toward the storage service
    async fn publish(&self, envelope: Envelope) -> Result<()>;
}

/// A client connection: somewhere to send requests and a stream of replies.
/// The stream ends when the connection is lost.
pub struct Connection {
    pub endpoint: Arc<dyn Endpoint>,
    pub inbound: mpsc::Receiver<Envelope>,
}
