//! Capacity monitor: periodic sampler driving the cleaning-mode state machine

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use super::state::MonitorTransition;
use super::storage::StorageCoordinator;
use crate::metrics::Metrics;

pub struct CapacityMonitor {
    coordinator: Arc<StorageCoordinator>,
    tick: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl CapacityMonitor {
    pub fn new(coordinator: Arc<StorageCoordinator>, tick: Duration) -> Self {
        Self {
            coordinator,
            tick,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Take one sample now
    pub async fn tick(&self) -> MonitorTransition {
        let transition = self.coordinator.evaluate_capacity().await;
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(transition);
        }
        transition
    }

    /// Sample every `tick` until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            tick_ms = self.tick.as_millis() as u64,
            threshold = self.coordinator.overflow_threshold(),
            "capacity monitor started"
        );

        let mut interval = tokio::time::interval(self.tick);
        // Don't burst-fire missed ticks
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately; skip it so samples are a full period apart
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("capacity monitor: shutdown signal received");
                    break;
                }
            }
        }
    }
}
