pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod runtime;
pub mod transport;
pub mod workers;

pub use config::AppConfig;
pub use coordinator::{
    AdmissionPolicy, CapacityMonitor, FileRecord, MonitorTransition, StorageCoordinator,
    StorageSnapshot,
};
pub use error::{PoolError, Result};
pub use metrics::Metrics;
pub use protocol::{Operation, StorageService};
pub use runtime::PoolService;
pub use transport::{MessageBus, RpcClient, RpcServer, StorageClient};
pub use workers::{CleanerWorker, ConnectionState, ProducerWorker, Reconnector};
