//! Storage state: the pool's bookkeeping and its cleaning-mode state machine
//!
//! Everything here is plain data mutated through `&mut self`; the coordinator
//! owns the only instance behind its mutex. Nothing in this file locks, sleeps
//! or logs, which keeps every transition testable with ordinary `#[test]`s.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Metadata for one stored file. Contents are never modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub name: String,
    pub size: u64,
}

/// A registered cleaner and whether it is free to claim work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanerRecord {
    pub id: String,
    pub idle: bool,
}

/// How uploads are weighed against the capacity.
///
/// - `check_before_insert`: admit only if the file fits (`occupied + size <= capacity`).
///   Occupancy never exceeds capacity.
/// - `insert_then_check`: admit whenever the pool is not already over capacity, so the
///   last admitted file may overshoot it. This is the behavior that lets the monitor
///   observe overflow and start a cleanup cycle on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    #[default]
    CheckBeforeInsert,
    InsertThenCheck,
}

/// Result of one monitor evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTransition {
    /// Not cleaning and within capacity
    Steady,
    /// Over capacity, strike `n` of the threshold recorded
    Strike(u32),
    /// Threshold reached, cleaning mode switched on
    Entered,
    /// Cleaning mode on and cleaners still busy
    StillCleaning,
    /// Pool drained or every cleaner idle, cleaning mode switched off
    Exited,
}

/// Point-in-time copy of the pool's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub capacity: u64,
    pub occupied: u64,
    pub cleaning_mode: bool,
    pub overflow_strikes: u32,
    pub file_count: usize,
    pub cleaner_count: usize,
    pub idle_cleaners: usize,
    pub admission: AdmissionPolicy,
}

/// Shared pool state
#[derive(Debug, Clone)]
pub struct StorageState {
    pub(crate) capacity: u64,
    pub(crate) occupied: u64,
    pub(crate) cleaning_mode: bool,
    pub(crate) overflow_strikes: u32,
    /// Insertion order is age order; the front is the oldest file.
    pub(crate) files: VecDeque<FileRecord>,
    pub(crate) cleaners: HashMap<String, CleanerRecord>,
    pub(crate) admission: AdmissionPolicy,
    next_file_id: u64,
}

impl StorageState {
    pub fn new(capacity: u64, admission: AdmissionPolicy) -> Self {
        Self {
            capacity,
            occupied: 0,
            cleaning_mode: false,
            overflow_strikes: 0,
            files: VecDeque::new(),
            cleaners: HashMap::new(),
            admission,
            next_file_id: 1,
        }
    }

    /// Register a cleaner as idle. Re-registering an id resets its record.
    pub fn register_cleaner(&mut self, id: &str) {
        self.cleaners.insert(
            id.to_string(),
            CleanerRecord {
                id: id.to_string(),
                idle: true,
            },
        );
    }

    pub fn cleaner_idle(&self, id: &str) -> Option<bool> {
        self.cleaners.get(id).map(|c| c.idle)
    }

    /// Returns false when the id is unknown.
    pub fn set_cleaner_idle(&mut self, id: &str, idle: bool) -> bool {
        match self.cleaners.get_mut(id) {
            Some(cleaner) => {
                cleaner.idle = idle;
                true
            }
            None => false,
        }
    }

    /// Occupancy after admitting `size`, or `None` when the upload is refused
    fn admitted_total(&self, size: u64) -> Option<u64> {
        let total = self.occupied.checked_add(size)?;
        let fits = match self.admission {
            AdmissionPolicy::CheckBeforeInsert => total <= self.capacity,
            AdmissionPolicy::InsertThenCheck => self.occupied <= self.capacity,
        };
        fits.then_some(total)
    }

    /// Append a file if the admission rule allows it. Rejection leaves state untouched.
    pub fn try_insert(&mut self, name: &str, size: u64) -> Option<FileRecord> {
        let total = self.admitted_total(size)?;

        let record = FileRecord {
            id: self.next_file_id,
            name: name.to_string(),
            size,
        };
        self.next_file_id += 1;
        self.occupied = total;
        self.files.push_back(record.clone());
        Some(record)
    }

    /// Remove the file at `index` in age order
    pub fn take_at(&mut self, index: usize) -> Option<FileRecord> {
        let file = self.files.remove(index)?;
        self.occupied -= file.size;
        Some(file)
    }

    /// Remove the oldest file on behalf of a registered cleaner
    pub fn remove_oldest(&mut self, cleaner_id: &str) -> Option<FileRecord> {
        if !self.cleaners.contains_key(cleaner_id) {
            return None;
        }
        let file = self.files.pop_front()?;
        self.occupied -= file.size;
        Some(file)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn set_capacity(&mut self, capacity: u64) {
        self.capacity = capacity;
    }

    /// Force the cleaning flag; the strike counter always restarts.
    pub fn set_cleaning_mode(&mut self, on: bool) {
        self.cleaning_mode = on;
        self.overflow_strikes = 0;
    }

    /// One monitor sample. Entering cleaning mode needs `threshold` consecutive
    /// over-capacity samples; leaving it happens on the first sample that finds
    /// the pool empty or every cleaner idle.
    pub fn evaluate_capacity(&mut self, threshold: u32) -> MonitorTransition {
        if self.cleaning_mode {
            let all_idle = self.cleaners.values().all(|c| c.idle);
            if self.occupied == 0 || all_idle {
                self.cleaning_mode = false;
                self.overflow_strikes = 0;
                return MonitorTransition::Exited;
            }
            return MonitorTransition::StillCleaning;
        }

        if self.occupied <= self.capacity {
            self.overflow_strikes = 0;
            return MonitorTransition::Steady;
        }

        self.overflow_strikes += 1;
        if self.overflow_strikes >= threshold {
            self.cleaning_mode = true;
            self.overflow_strikes = 0;
            MonitorTransition::Entered
        } else {
            MonitorTransition::Strike(self.overflow_strikes)
        }
    }

    /// `occupied` must always equal the sum of the stored sizes
    pub fn occupancy_consistent(&self) -> bool {
        self.files.iter().map(|f| f.size).sum::<u64>() == self.occupied
    }

    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot {
            capacity: self.capacity,
            occupied: self.occupied,
            cleaning_mode: self.cleaning_mode,
            overflow_strikes: self.overflow_strikes,
            file_count: self.files.len(),
            cleaner_count: self.cleaners.len(),
            idle_cleaners: self.cleaners.values().filter(|c| c.idle).count(),
            admission: self.admission,
        }
    }
}
