//! Storage coordinator: single owner of the pool state
//!
//! Every public operation is one critical section over `StorageState`.
//! Nothing awaits while the guard is held, and callers only ever receive
//! copies of what is inside.

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::state::{
    AdmissionPolicy, FileRecord, MonitorTransition, StorageSnapshot, StorageState,
};
use crate::error::{PoolError, Result};

pub struct StorageCoordinator {
    state: Mutex<StorageState>,
    overflow_threshold: u32,
}

impl StorageCoordinator {
    pub fn new(capacity: u64, admission: AdmissionPolicy, overflow_threshold: u32) -> Self {
        Self {
            state: Mutex::new(StorageState::new(capacity, admission)),
            overflow_threshold: overflow_threshold.max(1),
        }
    }

    pub fn overflow_threshold(&self) -> u32 {
        self.overflow_threshold
    }

    /// Add a cleaner to the registry as idle. Duplicate ids overwrite.
    pub async fn register_cleaner(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        state.register_cleaner(id);
        info!(cleaner_id = %id, cleaners = state.cleaners.len(), "cleaner registered");
        true
    }

    pub async fn is_cleaning_mode(&self) -> bool {
        self.state.lock().await.cleaning_mode
    }

    pub async fn get_cleaner_idle(&self, id: &str) -> Result<bool> {
        self.state
            .lock()
            .await
            .cleaner_idle(id)
            .ok_or_else(|| PoolError::UnknownCleaner(id.to_string()))
    }

    pub async fn set_cleaner_idle(&self, id: &str, idle: bool) -> Result<()> {
        if self.state.lock().await.set_cleaner_idle(id, idle) {
            debug!(cleaner_id = %id, idle, "cleaner idle flag updated");
            Ok(())
        } else {
            Err(PoolError::UnknownCleaner(id.to_string()))
        }
    }

    /// Store a file if the admission rule lets it in
    pub async fn try_send_file(&self, name: &str, size: u64) -> bool {
        let mut state = self.state.lock().await;
        match state.try_insert(name, size) {
            Some(file) => {
                info!(
                    file_id = file.id,
                    size,
                    occupied = state.occupied,
                    capacity = state.capacity,
                    "file added to storage"
                );
                true
            }
            None => {
                info!(
                    size,
                    occupied = state.occupied,
                    capacity = state.capacity,
                    "storage is full, upload rejected"
                );
                false
            }
        }
    }

    /// Remove and return the file at `index` in age order
    pub async fn try_get_file(&self, index: usize) -> Option<FileRecord> {
        let mut state = self.state.lock().await;
        match state.take_at(index) {
            Some(file) => {
                info!(
                    index,
                    file_id = file.id,
                    occupied = state.occupied,
                    "file handed to client and removed from storage"
                );
                Some(file)
            }
            None => {
                info!(index, files = state.file_count(), "no file at requested index");
                None
            }
        }
    }

    /// Remove the oldest file. False on an empty pool or an unknown cleaner.
    ///
    /// The caller is responsible for claiming and releasing its idle flag
    /// around this call.
    pub async fn try_remove_oldest_file(&self, cleaner_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.remove_oldest(cleaner_id) {
            Some(file) => {
                info!(
                    cleaner_id = %cleaner_id,
                    file_id = file.id,
                    occupied = state.occupied,
                    "oldest file removed"
                );
                true
            }
            None => {
                if state.cleaners.contains_key(cleaner_id) {
                    info!(cleaner_id = %cleaner_id, "no files left to remove");
                } else {
                    warn!(cleaner_id = %cleaner_id, "removal requested by unregistered cleaner");
                }
                false
            }
        }
    }

    pub async fn get_file_count(&self) -> usize {
        self.state.lock().await.file_count()
    }

    pub async fn snapshot(&self) -> StorageSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn set_capacity(&self, capacity: u64) {
        let mut state = self.state.lock().await;
        info!(old = state.capacity, new = capacity, "storage capacity changed");
        state.set_capacity(capacity);
    }

    /// Force cleaning mode on or off, bypassing the hysteresis
    pub async fn set_cleaning_mode(&self, on: bool) {
        self.state.lock().await.set_cleaning_mode(on);
        info!(cleaning_mode = on, "cleaning mode forced");
    }

    /// Run one capacity evaluation under the lock
    pub async fn evaluate_capacity(&self) -> MonitorTransition {
        let mut state = self.state.lock().await;
        let transition = state.evaluate_capacity(self.overflow_threshold);
        debug_assert!(state.occupancy_consistent());

        match transition {
            MonitorTransition::Strike(n) => warn!(
                occupied = state.occupied,
                capacity = state.capacity,
                "storage is over capacity ({}/{})",
                n,
                self.overflow_threshold
            ),
            MonitorTransition::Entered => {
                info!(occupied = state.occupied, "activating storage cleaning mode")
            }
            MonitorTransition::Exited => info!(
                occupied = state.occupied,
                "cleaning finished, switching off cleaning mode"
            ),
            MonitorTransition::Steady | MonitorTransition::StillCleaning => {}
        }
        transition
    }

    #[cfg(test)]
    pub(crate) async fn occupancy_consistent(&self) -> bool {
        self.state.lock().await.occupancy_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(capacity: u64) -> StorageCoordinator {
        StorageCoordinator::new(capacity, AdmissionPolicy::CheckBeforeInsert, 3)
    }

    #[tokio::test]
    async fn test_admission_boundary() {
        let coord = coordinator(200);
        assert!(coord.try_send_file("a", 120).await);
        assert!(!coord.try_send_file("b", 81).await);
        assert_eq!(coord.snapshot().await.occupied, 120);

        assert!(coord.try_send_file("c", 80).await);
        assert_eq!(coord.snapshot().await.occupied, 200);
        assert!(coord.occupancy_consistent().await);
    }

    #[tokio::test]
    async fn test_unknown_cleaner_is_a_distinct_failure() {
        let coord = coordinator(100);

        match coord.get_cleaner_idle("nonexistent").await {
            Err(PoolError::UnknownCleaner(id)) => assert_eq!(id, "nonexistent"),
            other => panic!("expected UnknownCleaner, got {other:?}"),
        }
        assert!(matches!(
            coord.set_cleaner_idle("nonexistent", true).await,
            Err(PoolError::UnknownCleaner(_))
        ));
    }

    #[tokio::test]
    async fn test_cleaner_idle_round_trip() {
        let coord = coordinator(100);
        assert!(coord.register_cleaner("c1").await);
        assert!(coord.get_cleaner_idle("c1").await.unwrap());

        coord.set_cleaner_idle("c1", false).await.unwrap();
        assert!(!coord.get_cleaner_idle("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_oldest_on_empty_pool() {
        let coord = coordinator(100);
        coord.register_cleaner("c1").await;
        let before = coord.snapshot().await;

        assert!(!coord.try_remove_oldest_file("c1").await);
        assert_eq!(coord.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_forced_cleaning_scenario() {
        let coord = coordinator(200);
        coord.register_cleaner("c1").await;
        coord.set_cleaning_mode(true).await;
        assert!(coord.try_send_file("f", 50).await);

        assert!(coord.try_remove_oldest_file("c1").await);
        let snap = coord.snapshot().await;
        assert_eq!(snap.occupied, 0);
        assert_eq!(snap.file_count, 0);
        assert_eq!(coord.get_file_count().await, 0);
    }

    #[tokio::test]
    async fn test_try_get_file_out_of_range() {
        let coord = coordinator(100);
        assert!(coord.try_get_file(0).await.is_none());

        coord.try_send_file("only", 10).await;
        assert!(coord.try_get_file(1).await.is_none());
        let file = coord.try_get_file(0).await.unwrap();
        assert_eq!(file.name, "only");
        assert_eq!(coord.snapshot().await.occupied, 0);
    }

    #[tokio::test]
    async fn test_shrinking_capacity_drives_monitor_into_cleaning() {
        let coord = coordinator(100);
        coord.register_cleaner("c1").await;
        coord.try_send_file("f", 80).await;
        coord.set_capacity(50).await;

        assert_eq!(coord.evaluate_capacity().await, MonitorTransition::Strike(1));
        assert_eq!(coord.evaluate_capacity().await, MonitorTransition::Strike(2));
        assert!(!coord.is_cleaning_mode().await);
        assert_eq!(coord.evaluate_capacity().await, MonitorTransition::Entered);
        assert!(coord.is_cleaning_mode().await);

        // the registered cleaner is idle, so the next sample ends the cycle
        assert_eq!(coord.evaluate_capacity().await, MonitorTransition::Exited);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_keep_occupancy_consistent() {
        let coord = std::sync::Arc::new(coordinator(1_000));
        let mut handles = Vec::new();
        for i in 0..50u64 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord.try_send_file(&format!("f{i}"), 7 + i % 40).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = coord.snapshot().await;
        assert!(snap.occupied <= snap.capacity);
        assert!(coord.occupancy_consistent().await);
    }
}
