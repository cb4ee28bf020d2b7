//! Aggregate metrics over error history

use crate::error_recovery::record::ErrorRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Aggregate view over the current history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatistics {
    pub total: usize,
    /// Count per kind name
    pub by_type: BTreeMap<String, usize>,
    /// Records whose recovery did not succeed
    pub unrecovered: usize,
    /// Records younger than the recency window
    pub recent_errors: usize,
}

impl ErrorStatistics {
    /// Compute statistics at `now`
    ///
    /// A record is recent when `now - timestamp < window`; records stamped in
    /// the future (clock skew) count as recent.
    pub fn compute(records: &[ErrorRecord], now: DateTime<Utc>, window: Duration) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let mut stats = ErrorStatistics {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            *stats
                .by_type
                .entry(record.kind().as_str().to_string())
                .or_default() += 1;
            if !record.recovered() {
                stats.unrecovered += 1;
            }
            if now.signed_duration_since(record.timestamp()) < window {
                stats.recent_errors += 1;
            }
        }

        stats
    }

    /// Count for a kind name, zero when absent
    pub fn count_for(&self, kind: &str) -> usize {
        self.by_type.get(kind).copied().unwrap_or(0)
    }

    /// Strictly more recent errors than `threshold`
    pub fn rate_exceeds(&self, threshold: usize) -> bool {
        self.recent_errors > threshold
    }
}
