//! Conversion history: records of completed conversions.
//!
//! The orchestrator only ever calls [`HistorySink::append`]; where records end
//! up is the host's business. [`HistoryLog`] is the bundled in-memory sink,
//! bounded and newest-first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One completed conversion. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub file_name: String,
    pub source_type: String,
    pub result_type: String,
    pub size: u64,
    pub completed_at: DateTime<Utc>,
}

/// Receives history records. Must not block or fail the conversion it records.
pub trait HistorySink: Send + Sync {
    fn append(&self, record: HistoryRecord);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistory;

impl HistorySink for NoopHistory {
    fn append(&self, _record: HistoryRecord) {}
}

/// Bounded in-memory history, newest first.
#[derive(Debug)]
pub struct HistoryLog {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryRecord>>,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(50)
    }
}

impl HistoryLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Snapshot, newest first.
    pub fn entries(&self) -> Vec<HistoryRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HistoryRecord>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HistorySink for HistoryLog {
    fn append(&self, record: HistoryRecord) {
        let mut entries = self.lock();
        entries.push_front(record);
        entries.truncate(self.capacity);
    }
}
