use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::coordinator::StorageCoordinator;
use crate::metrics::Metrics;
use crate::transport::MessageBus;

/// Shared state for gateway handlers
#[derive(Clone)]
pub struct GatewayState {
    /// The pool every REST call operates on
    pub coordinator: Arc<StorageCoordinator>,

    /// Bus the `/ws` bridge forwards onto
    pub bus: MessageBus,

    pub metrics: Arc<Metrics>,

    /// Gateway start time
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(coordinator: Arc<StorageCoordinator>, bus: MessageBus, metrics: Arc<Metrics>) -> Self {
        Self {
            coordinator,
            bus,
            metrics,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
