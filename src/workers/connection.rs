//! Connection state machine shared by every worker role
//!
//! A session connects, lets the role establish itself, then polls until
//! something fails. Any failure ends the session: the driver logs it, waits a
//! fixed backoff and starts over from `Disconnected` with a fresh connection.

use async_trait::async_trait;
use std::convert::Infallible;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::StorageService;
use crate::transport::{ws, MessageBus, RpcClient, StorageClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Registered,
    Polling,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Registered => write!(f, "REGISTERED"),
            ConnectionState::Polling => write!(f, "POLLING"),
        }
    }
}

/// Produces a fresh storage handle for each session
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn StorageService>>;
}

/// In-process bus; every connect gets its own reply address
pub struct BusConnector {
    bus: MessageBus,
    call_timeout: Option<Duration>,
}

impl BusConnector {
    pub fn new(bus: MessageBus, call_timeout: Option<Duration>) -> Self {
        Self { bus, call_timeout }
    }
}

#[async_trait]
impl Connector for BusConnector {
    async fn connect(&self) -> Result<Arc<dyn StorageService>> {
        let rpc = RpcClient::new(self.bus.connect(), self.call_timeout);
        Ok(Arc::new(StorageClient::new(rpc)))
    }
}

/// Remote coordinator behind the gateway's `/ws` bridge
pub struct WsConnector {
    url: String,
    queue_capacity: usize,
    call_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, queue_capacity: usize, call_timeout: Option<Duration>) -> Self {
        Self {
            url: url.into(),
            queue_capacity,
            call_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Arc<dyn StorageService>> {
        let connection = ws::connect(&self.url, self.queue_capacity).await?;
        let rpc = RpcClient::new(connection, self.call_timeout);
        Ok(Arc::new(StorageClient::new(rpc)))
    }
}

/// Hands out the same in-process service every time
pub struct DirectConnector {
    service: Arc<dyn StorageService>,
}

impl DirectConnector {
    pub fn new(service: Arc<dyn StorageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Connector for DirectConnector {
    async fn connect(&self) -> Result<Arc<dyn StorageService>> {
        Ok(self.service.clone())
    }
}

/// A worker loop body driven by [`Reconnector`]
#[async_trait]
pub trait PollingRole: Send {
    type Step: Debug + Send;

    fn name(&self) -> &'static str;

    /// Runs once per session, before the first poll
    async fn establish(&mut self, service: &dyn StorageService) -> Result<()>;

    async fn poll(&mut self, service: &dyn StorageService) -> Result<Self::Step>;

    /// Wait before the next poll
    fn next_delay(&mut self) -> Duration;
}

pub struct Reconnector<C> {
    connector: C,
    backoff: Duration,
    state_tx: watch::Sender<ConnectionState>,
}

impl<C: Connector> Reconnector<C> {
    pub fn new(connector: C, backoff: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            backoff,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Drive `role` until shutdown, then hand it back
    pub async fn run<R: PollingRole>(&self, mut role: R, mut shutdown_rx: broadcast::Receiver<()>) -> R {
        info!(role = role.name(), "worker starting");

        loop {
            let outcome = tokio::select! {
                result = self.session(&mut role) => Some(result),
                _ = shutdown_rx.recv() => None,
            };

            let err = match outcome {
                None => break,
                Some(Ok(never)) => match never {},
                Some(Err(e)) => e,
            };

            self.set_state(ConnectionState::Disconnected);
            warn!(
                role = role.name(),
                error = %describe_failure(&err),
                backoff_ms = self.backoff.as_millis() as u64,
                "session failed, restarting"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(role = role.name(), "worker stopped");
        role
    }

    async fn session<R: PollingRole>(&self, role: &mut R) -> Result<Infallible> {
        self.set_state(ConnectionState::Connecting);
        let service = self.connector.connect().await?;

        role.establish(service.as_ref()).await?;
        self.set_state(ConnectionState::Registered);

        loop {
            tokio::time::sleep(role.next_delay()).await;
            self.set_state(ConnectionState::Polling);
            let step = role.poll(service.as_ref()).await?;
            debug!(role = role.name(), ?step, "poll complete");
        }
    }
}

fn describe_failure(err: &crate::error::PoolError) -> String {
    if err.is_transport() {
        format!("transport failure: {err}")
    } else {
        err.to_string()
    }
}
