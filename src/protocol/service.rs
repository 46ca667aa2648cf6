use async_trait::async_trait;

use crate::coordinator::{FileRecord, StorageCoordinator};
use crate::error::Result;

/// The storage operation catalog as seen by a caller.
///
/// Implemented in-process by [`StorageCoordinator`] and remotely by
/// `transport::StorageClient`; workers only ever see this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn register_cleaner(&self, cleaner_id: &str) -> Result<bool>;

    /// Fails with `UnknownCleaner` for an id that was never registered
    async fn get_cleaner_idle(&self, cleaner_id: &str) -> Result<bool>;

    async fn set_cleaner_idle(&self, cleaner_id: &str, idle: bool) -> Result<()>;

    async fn is_cleaning_mode(&self) -> Result<bool>;

    async fn get_file_count(&self) -> Result<usize>;

    /// `Ok(false)` when the pool has no room; that is not an error
    async fn try_send_file(&self, name: &str, size: u64) -> Result<bool>;

    /// `Ok(None)` when no file sits at `index`
    async fn try_get_file(&self, index: usize) -> Result<Option<FileRecord>>;

    async fn try_remove_oldest_file(&self, cleaner_id: &str) -> Result<bool>;
}

#[async_trait]
impl StorageService for StorageCoordinator {
    async fn register_cleaner(&self, cleaner_id: &str) -> Result<bool> {
        Ok(StorageCoordinator::register_cleaner(self, cleaner_id).await)
    }

    async fn get_cleaner_idle(&self, cleaner_id: &str) -> Result<bool> {
        StorageCoordinator::get_cleaner_idle(self, cleaner_id).await
    }

    async fn set_cleaner_idle(&self, cleaner_id: &str, idle: bool) -> Result<()> {
        StorageCoordinator::set_cleaner_idle(self, cleaner_id, idle).await
    }

    async fn is_cleaning_mode(&self) -> Result<bool> {
        Ok(StorageCoordinator::is_cleaning_mode(self).await)
    }

    async fn get_file_count(&self) -> Result<usize> {
        Ok(StorageCoordinator::get_file_count(self).await)
    }

    async fn try_send_file(&self, name: &str, size: u64) -> Result<bool> {
        Ok(StorageCoordinator::try_send_file(self, name, size).await)
    }

    async fn try_get_file(&self, index: usize) -> Result<Option<FileRecord>> {
        Ok(StorageCoordinator::try_get_file(self, index).await)
    }

    async fn try_remove_oldest_file(&self, cleaner_id: &str) -> Result<bool> {
        Ok(StorageCoordinator::try_remove_oldest_file(self, cleaner_id).await)
    }
}
