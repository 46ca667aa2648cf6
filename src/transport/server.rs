//! Storage service consumer
//!
//! Drains the shared service queue, dispatches each request against the
//! coordinator on its own task and publishes the reply to the request's
//! reply address.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::bus::{MessageBus, SERVICE_ADDRESS};
use super::envelope::{Envelope, EnvelopeKind};
use crate::metrics::Metrics;
use crate::protocol::{dispatch, Operation, StorageService};

pub struct RpcServer {
    bus: MessageBus,
    service: Arc<dyn StorageService>,
    metrics: Arc<Metrics>,
    inbound: mpsc::Receiver<Envelope>,
}

impl RpcServer {
    /// Declare the service queue. Requests published after this returns are
    /// buffered until [`RpcServer::run`] starts draining.
    pub fn bind(bus: MessageBus, service: Arc<dyn StorageService>, metrics: Arc<Metrics>) -> Self {
        let inbound = bus.declare(SERVICE_ADDRESS);
        Self {
            bus,
            service,
            metrics,
            inbound,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(address = SERVICE_ADDRESS, "storage service consuming");

        loop {
            tokio::select! {
                received = self.inbound.recv() => {
                    let Some(envelope) = received else {
                        warn!("service queue closed");
                        break;
                    };
                    let bus = self.bus.clone();
                    let service = self.service.clone();
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        handle_request(&bus, service.as_ref(), &metrics, envelope).await;
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("storage service shutting down");
                    break;
                }
            }
        }

        self.bus.remove(SERVICE_ADDRESS);
    }
}

/// Answer one request envelope. Unknown operations get no reply.
pub async fn handle_request(
    bus: &MessageBus,
    service: &dyn StorageService,
    metrics: &Metrics,
    envelope: Envelope,
) {
    if envelope.kind != EnvelopeKind::Request {
        debug!(operation = %envelope.operation, "ignoring reply on service queue");
        return;
    }

    let operation = match envelope.operation.parse::<Operation>() {
        Ok(op) => op,
        Err(_) => {
            metrics.record_dropped_request();
            warn!(
                operation = %envelope.operation,
                correlation_id = %envelope.correlation_id,
                "unsupported operation, dropping request"
            );
            return;
        }
    };

    let body = dispatch(service, operation, envelope.payload.clone()).await;
    metrics.record_reply(operation, &body);

    let reply = match envelope.reply(&body) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(%operation, error = %e, "could not encode reply");
            return;
        }
    };

    if let Err(e) = bus.publish(&envelope.reply_to, reply).await {
        // the caller went away; nothing else to do with the reply
        debug!(
            %operation,
            reply_to = %envelope.reply_to,
            error = %e,
            "reply undeliverable"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{AdmissionPolicy, StorageCoordinator};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn coordinator() -> Arc<StorageCoordinator> {
        Arc::new(StorageCoordinator::new(100, AdmissionPolicy::CheckBeforeInsert, 3))
    }

    #[tokio::test]
    async fn test_request_is_answered_on_reply_address() {
        let bus = MessageBus::new(16);
        let mut replies = bus.declare("storage.client.test");
        let metrics = Metrics::new();

        let request = Envelope::request(
            "TrySendFile",
            "tok",
            "storage.client.test",
            json!({"name": "f", "size": 10}),
        );
        handle_request(&bus, coordinator().as_ref(), &metrics, request).await;

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.kind, EnvelopeKind::Reply);
        assert_eq!(reply.correlation_id, "tok");
        assert_eq!(reply.payload, json!({"status": "ok", "value": true}));
        assert_eq!(metrics.snapshot().requests_ok, 1);
        assert_eq!(metrics.snapshot().uploads_admitted, 1);
    }

    #[tokio::test]
    async fn test_unknown_operation_gets_no_reply() {
        let bus = MessageBus::new(16);
        let mut replies = bus.declare("storage.client.test");
        let metrics = Metrics::new();

        let request = Envelope::request("Format", "tok", "storage.client.test", Value::Null);
        handle_request(&bus, coordinator().as_ref(), &metrics, request).await;

        assert!(replies.try_recv().is_err());
        assert_eq!(metrics.snapshot().requests_dropped, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_unbinds_queue() {
        let bus = MessageBus::new(16);
        let server = RpcServer::bind(bus.clone(), coordinator(), Arc::new(Metrics::new()));
        assert!(bus.is_declared(SERVICE_ADDRESS));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("server should stop")
            .unwrap();
        assert!(!bus.is_declared(SERVICE_ADDRESS));
    }
}
