//! Process wiring for each CLI mode

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::coordinator::{CapacityMonitor, StorageCoordinator, StorageSnapshot};
use crate::error::Result;
use crate::gateway::{GatewayServer, GatewayState};
use crate::metrics::Metrics;
use crate::transport::{MessageBus, RpcServer};
use crate::workers::{
    BusConnector, CleanerWorker, Connector, PollingRole, ProducerWorker, Reconnector, WsConnector,
};

const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Coordinator, capacity monitor and bus server running together
pub struct PoolService {
    pub coordinator: Arc<StorageCoordinator>,
    pub bus: MessageBus,
    pub metrics: Arc<Metrics>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl PoolService {
    pub fn start(config: &AppConfig) -> Self {
        let coordinator = Arc::new(StorageCoordinator::new(
            config.storage.capacity,
            config.storage.admission,
            config.monitor.overflow_strikes,
        ));
        let bus = MessageBus::new(config.transport.queue_capacity);
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, _) = broadcast::channel(16);

        let server = RpcServer::bind(bus.clone(), coordinator.clone(), metrics.clone());
        let monitor = CapacityMonitor::new(coordinator.clone(), config.monitor.tick())
            .with_metrics(metrics.clone());

        let tasks = vec![
            tokio::spawn(server.run(shutdown_tx.subscribe())),
            tokio::spawn(monitor.run(shutdown_tx.subscribe())),
        ];

        info!(
            capacity = config.storage.capacity,
            admission = ?config.storage.admission,
            "storage pool started"
        );

        Self {
            coordinator,
            bus,
            metrics,
            shutdown_tx,
            tasks,
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn gateway_state(&self) -> GatewayState {
        GatewayState::new(self.coordinator.clone(), self.bus.clone(), self.metrics.clone())
    }

    /// Spawn a worker on this pool's bus, stopped together with the pool
    pub fn spawn_worker<R>(&mut self, role: R, config: &AppConfig, backoff: Duration)
    where
        R: PollingRole + 'static,
    {
        let connector = BusConnector::new(self.bus.clone(), config.transport.call_timeout());
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            Reconnector::new(connector, backoff).run(role, shutdown_rx).await;
        }));
    }

    pub async fn shutdown(self) -> StorageSnapshot {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            graceful_shutdown(task, SHUTDOWN_TIMEOUT_SECS, "pool task").await;
        }
        self.coordinator.snapshot().await
    }
}

/// `serve`: pool plus HTTP gateway until Ctrl+C
pub async fn run_serve(config: AppConfig) -> Result<()> {
    let pool = PoolService::start(&config);
    let gateway = GatewayServer::new(pool.gateway_state(), config.server.bind.clone());
    let gateway_task = tokio::spawn(gateway.run(pool.subscribe_shutdown()));

    // periodic status line
    let status_task = {
        let coordinator = pool.coordinator.clone();
        let metrics = pool.metrics.clone();
        let mut shutdown_rx = pool.subscribe_shutdown();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => metrics.log_status(&coordinator.snapshot().await),
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    };

    tokio::select! {
        _ = shutdown_signal() => {}
        result = gateway_task => {
            match result {
                Ok(Err(e)) => error!("Gateway stopped: {}", e),
                Err(e) => error!("Gateway task panicked: {}", e),
                Ok(Ok(())) => warn!("Gateway stopped unexpectedly"),
            }
        }
    }

    info!("Shutting down...");
    let snapshot = pool.shutdown().await;
    let _ = status_task.await;
    info!(
        occupied = snapshot.occupied,
        files = snapshot.file_count,
        "final pool state"
    );
    Ok(())
}

/// `cleaner`: one cleaner against a remote gateway
pub async fn run_cleaner(config: AppConfig, url: String) -> Result<()> {
    let connector = ws_connector(&config, url);
    let role = CleanerWorker::new(&config.cleaner);
    run_remote(connector, role, Duration::from_millis(config.cleaner.backoff_ms)).await;
    Ok(())
}

/// `client`: one producer/consumer against a remote gateway
pub async fn run_client(config: AppConfig, url: String) -> Result<()> {
    let connector = ws_connector(&config, url);
    let role = ProducerWorker::new(&config.client);
    run_remote(connector, role, Duration::from_millis(config.client.backoff_ms)).await;
    Ok(())
}

fn ws_connector(config: &AppConfig, url: String) -> WsConnector {
    WsConnector::new(
        url,
        config.transport.queue_capacity,
        config.transport.call_timeout(),
    )
}

async fn run_remote<C: Connector, R: PollingRole>(connector: C, role: R, backoff: Duration) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    Reconnector::new(connector, backoff).run(role, shutdown_rx).await;
}

/// `simulate`: pool, cleaners and clients in one process for `seconds`
pub async fn run_simulate(
    config: AppConfig,
    cleaners: usize,
    clients: usize,
    seconds: u64,
) -> Result<StorageSnapshot> {
    let mut pool = PoolService::start(&config);
    let cleaner_backoff = Duration::from_millis(config.cleaner.backoff_ms);
    let client_backoff = Duration::from_millis(config.client.backoff_ms);

    for _ in 0..cleaners {
        pool.spawn_worker(CleanerWorker::new(&config.cleaner), &config, cleaner_backoff);
    }
    for _ in 0..clients {
        pool.spawn_worker(ProducerWorker::new(&config.client), &config, client_backoff);
    }

    info!(cleaners, clients, seconds, "simulation running");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = shutdown_signal() => info!("simulation interrupted"),
    }

    let metrics = pool.metrics.clone();
    let snapshot = pool.shutdown().await;
    metrics.log_status(&snapshot);
    Ok(snapshot)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Graceful shutdown with timeout protection
async fn graceful_shutdown<F: std::future::Future>(shutdown_future: F, timeout_secs: u64, name: &str) {
    match timeout(Duration::from_secs(timeout_secs), shutdown_future).await {
        Ok(_) => info!("{} shutdown completed gracefully", name),
        Err(_) => warn!("{} shutdown timed out after {}s, forcing", name, timeout_secs),
    }
}
