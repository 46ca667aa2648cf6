//! Producer/consumer client
//!
//! Every jittered tick it either uploads a synthetic file or takes a random
//! one out of the pool. While the pool is in cleaning mode it sits the tick
//! out entirely.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::PollingRole;
use crate::config::ClientConfig;
use crate::coordinator::FileRecord;
use crate::error::Result;
use crate::protocol::StorageService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerAction {
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerStep {
    /// Cleaning mode; nothing attempted
    Paused,
    Uploaded,
    /// No room in the pool
    Rejected,
    Downloaded(FileRecord),
    /// The sampled index was gone by the time we asked
    Missed(usize),
    /// Pool had no files to pick from
    Empty,
}

pub struct ProducerWorker {
    rng: StdRng,
    poll_base_ms: u64,
    poll_jitter_ms: u64,
    min_file_size: u64,
    max_file_size: u64,
}

impl ProducerWorker {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: &ClientConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &ClientConfig, rng: StdRng) -> Self {
        Self {
            rng,
            poll_base_ms: config.poll_base_ms,
            poll_jitter_ms: config.poll_jitter_ms,
            min_file_size: config.min_file_size,
            max_file_size: config.max_file_size,
        }
    }

    pub fn choose_action(&mut self) -> ProducerAction {
        if self.rng.gen_bool(0.5) {
            ProducerAction::Upload
        } else {
            ProducerAction::Download
        }
    }

    /// Size in `[min_file_size, max_file_size)`
    fn file_size(&mut self) -> u64 {
        if self.max_file_size <= self.min_file_size {
            return self.min_file_size;
        }
        self.rng.gen_range(self.min_file_size..self.max_file_size)
    }

    pub async fn perform(
        &mut self,
        service: &dyn StorageService,
        action: ProducerAction,
    ) -> Result<ProducerStep> {
        match action {
            ProducerAction::Upload => {
                let name = Uuid::new_v4().to_string();
                let size = self.file_size();

                if service.try_send_file(&name, size).await? {
                    info!(file = %name, size, "File uploaded");
                    Ok(ProducerStep::Uploaded)
                } else {
                    warn!(file = %name, size, "Can't upload the file, storage is full");
                    Ok(ProducerStep::Rejected)
                }
            }
            ProducerAction::Download => {
                // the count can be stale by the time the take arrives; a miss is expected
                let count = service.get_file_count().await?;
                if count == 0 {
                    debug!("Nothing to download");
                    return Ok(ProducerStep::Empty);
                }

                let index = self.rng.gen_range(0..count);
                match service.try_get_file(index).await? {
                    Some(file) => {
                        info!(index, file = %file.name, size = file.size, "File downloaded");
                        Ok(ProducerStep::Downloaded(file))
                    }
                    None => {
                        warn!(index, "File doesn't exist any more");
                        Ok(ProducerStep::Missed(index))
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PollingRole for ProducerWorker {
    type Step = ProducerStep;

    fn name(&self) -> &'static str {
        "client"
    }

    async fn establish(&mut self, _service: &dyn StorageService) -> Result<()> {
        info!("client connected");
        Ok(())
    }

    async fn poll(&mut self, service: &dyn StorageService) -> Result<ProducerStep> {
        if service.is_cleaning_mode().await? {
            warn!("Storage is in cleaning mode, waiting for it to finish");
            return Ok(ProducerStep::Paused);
        }

        let action = self.choose_action();
        debug!(?action, "chose action");
        self.perform(service, action).await
    }

    fn next_delay(&mut self) -> Duration {
        let jitter = if self.poll_jitter_ms == 0 {
            0
        } else {
            self.rng.gen_range(0..self.poll_jitter_ms)
        };
        Duration::from_millis(self.poll_base_ms + jitter)
    }
}
