//! RPC client with correlation-token reply matching
//!
//! Every call registers a one-shot waiter under a fresh token before its
//! request is published. A single listener task drains the reply stream and
//! completes the waiter whose token matches; replies nobody waits for are
//! dropped.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::envelope::{Envelope, EnvelopeKind};
use super::{Connection, Endpoint};
use crate::error::{PoolError, Result};
use crate::protocol::ReplyBody;

type PendingCalls = DashMap<String, oneshot::Sender<Envelope>>;

pub struct RpcClient {
    endpoint: Arc<dyn Endpoint>,
    pending: Arc<PendingCalls>,
    closed: Arc<AtomicBool>,
    call_timeout: Option<Duration>,
    listener: JoinHandle<()>,
}

impl RpcClient {
    /// Start the reply listener for `connection`. `None` waits forever.
    pub fn new(connection: Connection, call_timeout: Option<Duration>) -> Self {
        let pending = Arc::new(PendingCalls::new());
        let closed = Arc::new(AtomicBool::new(false));
        let listener = tokio::spawn(Self::listen(
            connection.inbound,
            pending.clone(),
            closed.clone(),
        ));

        Self {
            endpoint: connection.endpoint,
            pending,
            closed,
            call_timeout,
            listener,
        }
    }

    async fn listen(
        mut inbound: mpsc::Receiver<Envelope>,
        pending: Arc<PendingCalls>,
        closed: Arc<AtomicBool>,
    ) {
        while let Some(envelope) = inbound.recv().await {
            if envelope.kind != EnvelopeKind::Reply {
                debug!(operation = %envelope.operation, "ignoring non-reply on reply queue");
                continue;
            }
            match pending.remove(&envelope.correlation_id) {
                Some((_, waiter)) => {
                    // the caller may have timed out in the meantime
                    let _ = waiter.send(envelope);
                }
                None => {
                    warn!(
                        correlation_id = %envelope.correlation_id,
                        operation = %envelope.operation,
                        "reply matches no outstanding call, dropping"
                    );
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        if !pending.is_empty() {
            warn!(outstanding = pending.len(), "reply stream closed, failing outstanding calls");
        }
        // dropping the senders wakes every waiter with an error
        pending.clear();
    }

    pub fn reply_to(&self) -> &str {
        self.endpoint.reply_to()
    }

    /// Calls currently waiting for a reply
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publish `operation` and, when `expect_reply` is set, wait for the
    /// matching reply. Fire-and-forget calls resolve to `Value::Null` as
    /// soon as the request is out.
    pub async fn call(&self, operation: &str, payload: Value, expect_reply: bool) -> Result<Value> {
        let correlation_id = Uuid::new_v4().to_string();
        let request = Envelope::request(operation, &correlation_id, self.endpoint.reply_to(), payload);

        if !expect_reply {
            self.endpoint.publish(request).await?;
            return Ok(Value::Null);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id.clone(), tx);

        if self.is_closed() {
            self.pending.remove(&correlation_id);
            return Err(PoolError::Transport(format!(
                "connection closed before {operation} was sent"
            )));
        }

        if let Err(e) = self.endpoint.publish(request).await {
            self.pending.remove(&correlation_id);
            return Err(e);
        }

        let started = Instant::now();
        let received = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.remove(&correlation_id);
                    return Err(PoolError::Timeout {
                        operation: operation.to_string(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        let reply = received.map_err(|_| {
            PoolError::Transport(format!("connection lost while awaiting {operation}"))
        })?;

        let body: ReplyBody = serde_json::from_value(reply.payload)?;
        body.into_result()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::bus::{MessageBus, SERVICE_ADDRESS};
    use serde_json::json;

    fn ok(value: Value) -> ReplyBody {
        ReplyBody::Ok { value }
    }

    #[tokio::test]
    async fn test_call_resolves_with_matching_reply() {
        let bus = MessageBus::new(16);
        let mut service = bus.declare(SERVICE_ADDRESS);
        let client = RpcClient::new(bus.connect(), Some(Duration::from_secs(5)));

        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let request = service.recv().await.unwrap();
                let reply = request.reply(&ok(json!(7))).unwrap();
                bus.publish(&request.reply_to, reply).await.unwrap();
            })
        };

        let value = client.call("GetFileCount", Value::Null, true).await.unwrap();
        assert_eq!(value, json!(7));
        assert_eq!(client.outstanding(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_interleaved_replies_reach_their_own_callers() {
        let bus = MessageBus::new(64);
        let mut service = bus.declare(SERVICE_ADDRESS);
        let client = Arc::new(RpcClient::new(bus.connect(), Some(Duration::from_secs(5))));
        const CALLS: usize = 16;

        // collect every request, then answer in reverse order echoing the input
        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let mut requests = Vec::new();
                while requests.len() < CALLS {
                    requests.push(service.recv().await.unwrap());
                }
                for request in requests.into_iter().rev() {
                    let echoed = request.payload["index"].clone();
                    let reply = request.reply(&ok(echoed)).unwrap();
                    bus.publish(&request.reply_to, reply).await.unwrap();
                }
            })
        };

        let calls = (0..CALLS).map(|i| {
            let client = client.clone();
            async move {
                let value = client
                    .call("TryGetFile", json!({ "index": i }), true)
                    .await
                    .unwrap();
                (i, value)
            }
        });

        for (i, value) in futures_util::future::join_all(calls).await {
            assert_eq!(value, json!(i));
        }
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_removes_waiter() {
        let bus = MessageBus::new(16);
        let _service = bus.declare(SERVICE_ADDRESS);
        let client = RpcClient::new(bus.connect(), Some(Duration::from_millis(50)));

        let err = client.call("IsCleaningMode", Value::Null, true).await.unwrap_err();
        assert!(matches!(err, PoolError::Timeout { ref operation, .. } if operation == "IsCleaningMode"));
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_reply_is_dropped() {
        let bus = MessageBus::new(16);
        let mut service = bus.declare(SERVICE_ADDRESS);
        let client = RpcClient::new(bus.connect(), Some(Duration::from_secs(5)));
        let reply_to = client.reply_to().to_string();

        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let request = service.recv().await.unwrap();

                let mut stray = request.reply(&ok(json!("stray"))).unwrap();
                stray.correlation_id = "nobody-asked".into();
                bus.publish(&reply_to, stray).await.unwrap();

                let reply = request.reply(&ok(json!("mine"))).unwrap();
                bus.publish(&request.reply_to, reply).await.unwrap();
            })
        };

        let value = client.call("GetFileCount", Value::Null, true).await.unwrap();
        assert_eq!(value, json!("mine"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_fire_and_forget_returns_null_without_reply() {
        let bus = MessageBus::new(16);
        let mut service = bus.declare(SERVICE_ADDRESS);
        let client = RpcClient::new(bus.connect(), None);

        let value = client
            .call("SetCleanerIdle", json!({"cleaner_id": "c1", "idle": true}), false)
            .await
            .unwrap();

        assert_eq!(value, Value::Null);
        assert_eq!(client.outstanding(), 0);
        assert_eq!(service.recv().await.unwrap().operation, "SetCleanerIdle");
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_as_pool_error() {
        let bus = MessageBus::new(16);
        let mut service = bus.declare(SERVICE_ADDRESS);
        let client = RpcClient::new(bus.connect(), Some(Duration::from_secs(5)));

        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let request = service.recv().await.unwrap();
                let body = ReplyBody::Error {
                    error: (&PoolError::UnknownCleaner("ghost".into())).into(),
                };
                let reply = request.reply(&body).unwrap();
                bus.publish(&request.reply_to, reply).await.unwrap();
            })
        };

        let err = client
            .call("GetCleanerIdle", json!({"cleaner_id": "ghost"}), true)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::UnknownCleaner(id) if id == "ghost"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_stream_fails_outstanding_calls() {
        let bus = MessageBus::new(16);
        let mut service = bus.declare(SERVICE_ADDRESS);
        let client = RpcClient::new(bus.connect(), None);
        let reply_to = client.reply_to().to_string();

        let closer = {
            let bus = bus.clone();
            tokio::spawn(async move {
                service.recv().await.unwrap();
                // unbinding the reply queue ends the client's inbound stream
                bus.remove(&reply_to);
            })
        };

        let err = client.call("GetFileCount", Value::Null, true).await.unwrap_err();
        assert!(err.is_transport());
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_no_waiter() {
        let bus = MessageBus::new(16);
        let client = RpcClient::new(bus.connect(), None);

        let err = client.call("GetFileCount", Value::Null, true).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(client.outstanding(), 0);
    }
}
