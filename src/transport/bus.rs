//! In-process message bus
//!
//! A direct exchange: every address owns one bounded queue, and a publish
//! lands in exactly the queue bound to its routing address.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::envelope::Envelope;
use super::{Connection, Endpoint};
use crate::error::{PoolError, Result};

/// Queue consumed by the storage coordinator
pub const SERVICE_ADDRESS: &str = "storage.service";

/// Prefix of every per-client reply queue
pub const CLIENT_ADDRESS_PREFIX: &str = "storage.client.";

/// Fresh, unique reply address for one client connection
pub fn client_address() -> String {
    format!("{CLIENT_ADDRESS_PREFIX}{}", Uuid::new_v4())
}

#[derive(Clone)]
pub struct MessageBus {
    queues: Arc<DashMap<String, mpsc::Sender<Envelope>>>,
    queue_capacity: usize,
}

impl MessageBus {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Bind a queue to `address` and hand back its consumer.
    /// Re-declaring an address replaces the previous queue.
    pub fn declare(&self, address: &str) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.queues.insert(address.to_string(), tx);
        debug!(address, "queue declared");
        rx
    }

    pub fn remove(&self, address: &str) {
        if self.queues.remove(address).is_some() {
            debug!(address, "queue removed");
        }
    }

    pub fn is_declared(&self, address: &str) -> bool {
        self.queues.contains_key(address)
    }

    pub async fn publish(&self, address: &str, envelope: Envelope) -> Result<()> {
        // clone the sender out so no map guard is held across the await
        let tx = self
            .queues
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PoolError::Transport(format!("no queue bound to '{address}'")))?;

        tx.send(envelope).await.map_err(|_| {
            self.queues.remove_if(address, |_, sender| sender.is_closed());
            PoolError::Transport(format!("queue '{address}' is closed"))
        })
    }

    /// Open a client connection with its own reply queue
    pub fn connect(&self) -> Connection {
        let reply_to = client_address();
        let inbound = self.declare(&reply_to);
        Connection {
            endpoint: Arc::new(BusEndpoint {
                bus: self.clone(),
                reply_to,
            }),
            inbound,
        }
    }
}

/// Client side of an in-process connection. Dropping it unbinds the reply queue.
pub struct BusEndpoint {
    bus: MessageBus,
    reply_to: String,
}

#[async_trait]
impl Endpoint for BusEndpoint {
    fn reply_to(&self) -> &str {
        &self.reply_to
    }

    async fn publish(&self, envelope: Envelope) -> Result<()> {
        self.bus.publish(SERVICE_ADDRESS, envelope).await
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        self.bus.remove(&self.reply_to);
    }
}
