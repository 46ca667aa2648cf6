use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::rpc::RpcClient;
use crate::coordinator::FileRecord;
use crate::error::Result;
use crate::protocol::{
    CleanerIdRequest, GetFileRequest, Operation, SendFileRequest, SetIdleRequest, StorageService,
};

/// Remote handle on the storage coordinator
pub struct StorageClient {
    rpc: RpcClient,
}

impl StorageClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    async fn invoke<T: DeserializeOwned>(&self, operation: Operation, payload: Value) -> Result<T> {
        let value = self.rpc.call(operation.as_str(), payload, true).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn invoke_with<R: Serialize, T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: &R,
    ) -> Result<T> {
        self.invoke(operation, serde_json::to_value(request)?).await
    }
}

fn cleaner(cleaner_id: &str) -> CleanerIdRequest {
    CleanerIdRequest {
        cleaner_id: cleaner_id.to_string(),
    }
}

#[async_trait]
impl StorageService for StorageClient {
    async fn register_cleaner(&self, cleaner_id: &str) -> Result<bool> {
        self.invoke_with(Operation::RegisterCleaner, &cleaner(cleaner_id))
            .await
    }

    async fn get_cleaner_idle(&self, cleaner_id: &str) -> Result<bool> {
        self.invoke_with(Operation::GetCleanerIdle, &cleaner(cleaner_id))
            .await
    }

    async fn set_cleaner_idle(&self, cleaner_id: &str, idle: bool) -> Result<()> {
        let request = SetIdleRequest {
            cleaner_id: cleaner_id.to_string(),
            idle,
        };
        self.invoke_with(Operation::SetCleanerIdle, &request).await
    }

    async fn is_cleaning_mode(&self) -> Result<bool> {
        self.invoke(Operation::IsCleaningMode, Value::Null).await
    }

    async fn get_file_count(&self) -> Result<usize> {
        self.invoke(Operation::GetFileCount, Value::Null).await
    }

    async fn try_send_file(&self, name: &str, size: u64) -> Result<bool> {
        let request = SendFileRequest {
            name: name.to_string(),
            size,
        };
        self.invoke_with(Operation::TrySendFile, &request).await
    }

    async fn try_get_file(&self, index: usize) -> Result<Option<FileRecord>> {
        self.invoke_with(Operation::TryGetFile, &GetFileRequest::new(index))
            .await
    }

    async fn try_remove_oldest_file(&self, cleaner_id: &str) -> Result<bool> {
        self.invoke_with(Operation::TryRemoveOldestFile, &cleaner(cleaner_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{AdmissionPolicy, StorageCoordinator};
    use crate::error::PoolError;
    use crate::metrics::Metrics;
    use crate::transport::{MessageBus, RpcServer};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    async fn served(capacity: u64) -> (StorageClient, broadcast::Sender<()>) {
        let bus = MessageBus::new(32);
        let coord = Arc::new(StorageCoordinator::new(
            capacity,
            AdmissionPolicy::CheckBeforeInsert,
            3,
        ));
        let server = RpcServer::bind(bus.clone(), coord, Arc::new(Metrics::new()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(server.run(shutdown_rx));

        let client = StorageClient::new(RpcClient::new(
            bus.connect(),
            Some(Duration::from_secs(5)),
        ));
        (client, shutdown_tx)
    }

    #[tokio::test]
    async fn test_full_catalog_over_the_bus() {
        let (client, _shutdown) = served(100).await;

        assert!(client.register_cleaner("c1").await.unwrap());
        assert!(client.get_cleaner_idle("c1").await.unwrap());
        client.set_cleaner_idle("c1", false).await.unwrap();
        assert!(!client.get_cleaner_idle("c1").await.unwrap());

        assert!(!client.is_cleaning_mode().await.unwrap());
        assert!(client.try_send_file("a", 60).await.unwrap());
        assert!(!client.try_send_file("b", 60).await.unwrap());
        assert_eq!(client.get_file_count().await.unwrap(), 1);

        assert!(client.try_remove_oldest_file("c1").await.unwrap());
        assert!(client.try_send_file("b", 60).await.unwrap());

        let taken = client.try_get_file(0).await.unwrap().unwrap();
        assert_eq!(taken.name, "b");
        assert_eq!(client.try_get_file(0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_cleaner_round_trips_as_error() {
        let (client, _shutdown) = served(100).await;
        let err = client.get_cleaner_idle("nobody").await.unwrap_err();
        assert!(matches!(err, PoolError::UnknownCleaner(_)));
    }
}
