//! Bounded, most-recent-first history of handled errors

use crate::error_recovery::record::ErrorRecord;
use crate::utils::{safe_read_lock, safe_write_lock};
use std::collections::VecDeque;
use std::sync::RwLock;
use tracing::debug;

/// Ring of error records; index 0 is always the newest
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    records: RwLock<VecDeque<ErrorRecord>>,
}

impl HistoryStore {
    /// `capacity` is clamped to at least one record
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the front, evicting the oldest record beyond capacity
    pub fn push(&self, record: ErrorRecord) {
        let mut records = safe_write_lock(&self.records, "HistoryStore::push");
        records.push_front(record);
        while records.len() > self.capacity {
            if let Some(evicted) = records.pop_back() {
                debug!("Evicted error record {} from history", evicted.id());
            }
        }
    }

    /// Fix the recovery outcome of a stored record
    ///
    /// Returns false when the record is no longer in history (evicted or cleared).
    pub fn settle(&self, id: &str, recovered: bool) -> bool {
        let mut records = safe_write_lock(&self.records, "HistoryStore::settle");
        match records.iter_mut().find(|r| r.id() == id) {
            Some(record) => {
                record.settle(recovered);
                true
            }
            None => false,
        }
    }

    /// The first `limit` records (all when `None`), newest first
    pub fn recent(&self, limit: Option<usize>) -> Vec<ErrorRecord> {
        let records = safe_read_lock(&self.records, "HistoryStore::recent");
        let take = limit.unwrap_or(records.len());
        records.iter().take(take).cloned().collect()
    }

    pub fn len(&self) -> usize {
        safe_read_lock(&self.records, "HistoryStore::len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        safe_write_lock(&self.records, "HistoryStore::clear").clear();
    }
}
