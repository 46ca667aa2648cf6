//! Storage protocol: the operation catalog shared by every transport
//!
//! Names, payload shapes and reply encoding live here so that the bus server,
//! the WebSocket bridge and the REST gateway all agree on one catalog.

pub mod dispatch;
pub mod service;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{PoolError, RemoteError, Result};

pub use dispatch::dispatch;
pub use service::StorageService;

/// RPC operations understood by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    RegisterCleaner,
    GetCleanerIdle,
    SetCleanerIdle,
    IsCleaningMode,
    GetFileCount,
    TrySendFile,
    TryGetFile,
    TryRemoveOldestFile,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::RegisterCleaner,
        Operation::GetCleanerIdle,
        Operation::SetCleanerIdle,
        Operation::IsCleaningMode,
        Operation::GetFileCount,
        Operation::TrySendFile,
        Operation::TryGetFile,
        Operation::TryRemoveOldestFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::RegisterCleaner => "RegisterCleaner",
            Operation::GetCleanerIdle => "GetCleanerIdle",
            Operation::SetCleanerIdle => "SetCleanerIdle",
            Operation::IsCleaningMode => "IsCleaningMode",
            Operation::GetFileCount => "GetFileCount",
            Operation::TrySendFile => "TrySendFile",
            Operation::TryGetFile => "TryGetFile",
            Operation::TryRemoveOldestFile => "TryRemoveOldestFile",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| PoolError::Protocol(format!("unsupported operation '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanerIdRequest {
    pub cleaner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetIdleRequest {
    pub cleaner_id: String,
    pub idle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFileRequest {
    pub name: String,
    pub size: u64,
}

/// Position is a signed wire integer; anything outside the file list is a miss
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileRequest {
    pub index: i64,
}

impl GetFileRequest {
    pub fn new(index: usize) -> Self {
        Self {
            index: i64::try_from(index).unwrap_or(i64::MAX),
        }
    }

    /// `None` for indexes no file list can hold (negative or past `usize::MAX`)
    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }
}

/// Payload of a reply envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyBody {
    Ok { value: Value },
    Error { error: RemoteError },
}

impl ReplyBody {
    pub fn into_result(self) -> Result<Value> {
        match self {
            ReplyBody::Ok { value } => Ok(value),
            ReplyBody::Error { error } => Err(error.into()),
        }
    }
}
