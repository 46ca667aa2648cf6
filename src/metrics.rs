use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

use crate::coordinator::{MonitorTransition, StorageSnapshot};
use crate::protocol::{Operation, ReplyBody};

/// Metrics collector for observability
pub struct Metrics {
    /// Requests answered with an ok reply
    pub requests_ok: AtomicU64,
    /// Requests answered with an error reply
    pub requests_failed: AtomicU64,
    /// Requests dropped without a reply
    pub requests_dropped: AtomicU64,
    /// WebSocket clients bridged onto the bus
    pub ws_connections: AtomicU64,
    pub uploads_admitted: AtomicU64,
    pub uploads_rejected: AtomicU64,
    pub downloads: AtomicU64,
    pub cleanups: AtomicU64,
    pub cleaning_mode_entries: AtomicU64,
    pub cleaning_mode_exits: AtomicU64,
    /// Unix seconds of the last recorded event
    last_update: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_ok: u64,
    pub requests_failed: u64,
    pub requests_dropped: u64,
    pub ws_connections: u64,
    pub uploads_admitted: u64,
    pub uploads_rejected: u64,
    pub downloads: u64,
    pub cleanups: u64,
    pub cleaning_mode_entries: u64,
    pub cleaning_mode_exits: u64,
    pub last_update: i64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_ok: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_dropped: AtomicU64::new(0),
            ws_connections: AtomicU64::new(0),
            uploads_admitted: AtomicU64::new(0),
            uploads_rejected: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
            cleaning_mode_entries: AtomicU64::new(0),
            cleaning_mode_exits: AtomicU64::new(0),
            last_update: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    fn touch(&self) {
        self.last_update.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Count one answered request and the catalog outcome it carried
    pub fn record_reply(&self, operation: Operation, body: &ReplyBody) {
        let ReplyBody::Ok { value } = body else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
            self.touch();
            return;
        };
        self.requests_ok.fetch_add(1, Ordering::Relaxed);

        match operation {
            Operation::TrySendFile => self.record_upload(value.as_bool() == Some(true)),
            Operation::TryGetFile => self.record_download(!value.is_null()),
            Operation::TryRemoveOldestFile => self.record_cleanup(value.as_bool() == Some(true)),
            _ => self.touch(),
        }
    }

    pub fn record_upload(&self, admitted: bool) {
        if admitted {
            self.uploads_admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.touch();
    }

    pub fn record_download(&self, found: bool) {
        if found {
            self.downloads.fetch_add(1, Ordering::Relaxed);
        }
        self.touch();
    }

    pub fn record_cleanup(&self, removed: bool) {
        if removed {
            self.cleanups.fetch_add(1, Ordering::Relaxed);
        }
        self.touch();
    }

    pub fn record_dropped_request(&self) {
        self.requests_dropped.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn inc_ws_connections(&self) {
        self.ws_connections.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Count monitor transitions that flip the cleaning flag
    pub fn record_transition(&self, transition: MonitorTransition) {
        match transition {
            MonitorTransition::Entered => {
                self.cleaning_mode_entries.fetch_add(1, Ordering::Relaxed);
            }
            MonitorTransition::Exited => {
                self.cleaning_mode_exits.fetch_add(1, Ordering::Relaxed);
            }
            _ => return,
        }
        self.touch();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_ok: self.requests_ok.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_dropped: self.requests_dropped.load(Ordering::Relaxed),
            ws_connections: self.ws_connections.load(Ordering::Relaxed),
            uploads_admitted: self.uploads_admitted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            cleanups: self.cleanups.load(Ordering::Relaxed),
            cleaning_mode_entries: self.cleaning_mode_entries.load(Ordering::Relaxed),
            cleaning_mode_exits: self.cleaning_mode_exits.load(Ordering::Relaxed),
            last_update: self.last_update.load(Ordering::Relaxed),
        }
    }

    /// Get current metrics as a formatted string
    pub fn summary(&self, storage: &StorageSnapshot) -> String {
        let m = self.snapshot();
        format!(
            r#"
=== POOLWARDEN STATUS ===
Occupied: {}/{} | Files: {} | Cleaning: {}
Cleaners: {} ({} idle) | Strikes: {}
Requests: {} ok / {} failed / {} dropped
Uploads: {} admitted / {} rejected | Downloads: {} | Cleanups: {}
========================="#,
            storage.occupied,
            storage.capacity,
            storage.file_count,
            storage.cleaning_mode,
            storage.cleaner_count,
            storage.idle_cleaners,
            storage.overflow_strikes,
            m.requests_ok,
            m.requests_failed,
            m.requests_dropped,
            m.uploads_admitted,
            m.uploads_rejected,
            m.downloads,
            m.cleanups,
        )
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self, storage: &StorageSnapshot) -> String {
        let m = self.snapshot();
        format!(
            r#"# HELP poolwarden_requests_ok_total Requests answered with an ok reply
# TYPE poolwarden_requests_ok_total counter
poolwarden_requests_ok_total {}

# HELP poolwarden_requests_failed_total Requests answered with an error reply
# TYPE poolwarden_requests_failed_total counter
poolwarden_requests_failed_total {}

# HELP poolwarden_requests_dropped_total Requests dropped without a reply
# TYPE poolwarden_requests_dropped_total counter
poolwarden_requests_dropped_total {}

# HELP poolwarden_ws_connections_total WebSocket clients bridged
# TYPE poolwarden_ws_connections_total counter
poolwarden_ws_connections_total {}

# HELP poolwarden_uploads_admitted_total Uploads admitted into the pool
# TYPE poolwarden_uploads_admitted_total counter
poolwarden_uploads_admitted_total {}

# HELP poolwarden_uploads_rejected_total Uploads rejected for lack of room
# TYPE poolwarden_uploads_rejected_total counter
poolwarden_uploads_rejected_total {}

# HELP poolwarden_downloads_total Files taken out of the pool
# TYPE poolwarden_downloads_total counter
poolwarden_downloads_total {}

# HELP poolwarden_cleanups_total Files removed by cleaners
# TYPE poolwarden_cleanups_total counter
poolwarden_cleanups_total {}

# HELP poolwarden_cleaning_mode_entries_total Times cleaning mode was entered
# TYPE poolwarden_cleaning_mode_entries_total counter
poolwarden_cleaning_mode_entries_total {}

# HELP poolwarden_occupied_bytes Occupied storage
# TYPE poolwarden_occupied_bytes gauge
poolwarden_occupied_bytes {}

# HELP poolwarden_capacity_bytes Storage capacity
# TYPE poolwarden_capacity_bytes gauge
poolwarden_capacity_bytes {}

# HELP poolwarden_cleaning_mode Whether cleaning mode is on
# TYPE poolwarden_cleaning_mode gauge
poolwarden_cleaning_mode {}
"#,
            m.requests_ok,
            m.requests_failed,
            m.requests_dropped,
            m.ws_connections,
            m.uploads_admitted,
            m.uploads_rejected,
            m.downloads,
            m.cleanups,
            m.cleaning_mode_entries,
            storage.occupied,
            storage.capacity,
            u8::from(storage.cleaning_mode),
        )
    }

    /// Log periodic status
    pub fn log_status(&self, storage: &StorageSnapshot) {
        info!("{}", self.summary(storage));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
