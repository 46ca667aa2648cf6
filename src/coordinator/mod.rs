//! Storage Coordinator
//!
//! Owns the shared pool: capacity, occupancy, file list, cleaner registry and
//! the cleaning-mode flag. Remote callers reach it through the transport; the
//! capacity monitor runs beside it and flips the flag that clients poll.

pub mod monitor;
pub mod state;
pub mod storage;

pub use monitor::CapacityMonitor;
pub use state::{
    AdmissionPolicy, CleanerRecord, FileRecord, MonitorTransition, StorageSnapshot, StorageState,
};
pub use storage::StorageCoordinator;
