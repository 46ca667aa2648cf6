//! Client-side workers
//!
//! Each role is a sequential loop driven by [`Reconnector`], which owns the
//! connect / establish / poll / back off cycle.

pub mod cleaner;
pub mod connection;
pub mod producer;

pub use cleaner::{CleanerStep, CleanerWorker};
pub use connection::{
    BusConnector, ConnectionState, Connector, DirectConnector, PollingRole, Reconnector,
    WsConnector,
};
pub use producer::{ProducerAction, ProducerStep, ProducerWorker};
