//! Cleaner worker
//!
//! Registers under a fresh identity, then waits for cleaning mode. Each
//! cleaning-mode cycle it claims itself busy once, removes the oldest file and
//! releases itself, whether or not the removal found anything.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::PollingRole;
use crate::config::CleanerConfig;
use crate::error::{PoolError, Result};
use crate::protocol::StorageService;

/// What one cleaner poll ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanerStep {
    NotCleaning,
    /// Already claimed once during this cleaning cycle
    AlreadyActed,
    /// The coordinator reports this cleaner as not idle
    Busy,
    Removed,
    /// Claimed, but another cleaner emptied the pool first
    NothingRemoved,
}

pub struct CleanerWorker {
    id: Option<String>,
    has_acted_this_cycle: bool,
    poll_interval: Duration,
    work_delay_max_ms: u64,
    rng: StdRng,
}

impl CleanerWorker {
    pub fn new(config: &CleanerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: &CleanerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &CleanerConfig, rng: StdRng) -> Self {
        Self {
            id: None,
            has_acted_this_cycle: false,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            work_delay_max_ms: config.work_delay_max_ms,
            rng,
        }
    }

    /// Identity registered by the current session
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn has_acted_this_cycle(&self) -> bool {
        self.has_acted_this_cycle
    }

    fn work_delay(&mut self) -> Duration {
        if self.work_delay_max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..self.work_delay_max_ms))
    }
}

#[async_trait]
impl PollingRole for CleanerWorker {
    type Step = CleanerStep;

    fn name(&self) -> &'static str {
        "cleaner"
    }

    async fn establish(&mut self, service: &dyn StorageService) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        service.register_cleaner(&id).await?;
        info!(cleaner_id = %id, "It's a new day to start cleaning bits");

        self.id = Some(id);
        self.has_acted_this_cycle = false;
        Ok(())
    }

    async fn poll(&mut self, service: &dyn StorageService) -> Result<CleanerStep> {
        let id = self
            .id
            .clone()
            .ok_or_else(|| PoolError::Internal("cleaner polled before registering".to_string()))?;

        if !service.is_cleaning_mode().await? {
            self.has_acted_this_cycle = false;
            debug!(cleaner_id = %id, "Nothing to clean right now");
            return Ok(CleanerStep::NotCleaning);
        }

        if self.has_acted_this_cycle {
            return Ok(CleanerStep::AlreadyActed);
        }

        if !service.get_cleaner_idle(&id).await? {
            return Ok(CleanerStep::Busy);
        }

        service.set_cleaner_idle(&id, false).await?;

        let work = self.work_delay();
        if !work.is_zero() {
            tokio::time::sleep(work).await;
        }

        info!(cleaner_id = %id, "Removing the oldest file from storage");
        let removal = service.try_remove_oldest_file(&id).await;
        let release = service.set_cleaner_idle(&id, true).await;
        // one claim per cycle, successful or not
        self.has_acted_this_cycle = true;

        let removed = removal?;
        release?;

        if removed {
            info!(cleaner_id = %id, "File removed");
            Ok(CleanerStep::Removed)
        } else {
            warn!(cleaner_id = %id, "Nothing left to remove, resuming");
            Ok(CleanerStep::NothingRemoved)
        }
    }

    fn next_delay(&mut self) -> Duration {
        self.poll_interval
    }
}
