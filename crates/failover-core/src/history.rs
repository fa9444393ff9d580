//! History & metrics store (C6) — an append-only, bounded-capacity log of
//! past failover attempts plus on-demand summary statistics.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailoverErrorKind;
use crate::executor::StepRecord;

/// The sealed, immutable audit artefact of one failover attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRecord {
    pub id: Uuid,
    pub source_region: String,
    pub target_region: String,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub total_duration_ms: u64,
    pub sla_compliant: bool,
    pub steps: Vec<StepRecord>,
    pub error: Option<FailoverRecordError>,
}

/// The first fatal error a failed attempt encountered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRecordError {
    pub kind: FailoverErrorKind,
    pub message: String,
}

/// Derived statistics over stored records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub mean_duration_ms: f64,
    pub median_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub compliance_rate: f64,
}

impl MetricsSnapshot {
    fn empty() -> Self {
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            mean_duration_ms: 0.0,
            median_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            compliance_rate: 0.0,
        }
    }
}

/// C6: bounded-capacity append-only store. All operations serialise
/// internally via a single lock; readers see a consistent point-in-time
/// view.
pub struct HistoryStore {
    capacity: usize,
    records: RwLock<VecDeque<FailoverRecord>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Constant-time insertion at the tail; the oldest record is evicted
    /// on the insertion that would exceed capacity, not before.
    pub fn append(&self, record: FailoverRecord) {
        let mut guard = self.records.write();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(record);
    }

    /// The most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<FailoverRecord> {
        self.records.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn last(&self) -> Option<FailoverRecord> {
        self.records.read().back().cloned()
    }

    /// Computed on demand; O(N) over stored records, acceptable given the
    /// capacity bound.
    pub fn summary(&self) -> MetricsSnapshot {
        let guard = self.records.read();
        if guard.is_empty() {
            return MetricsSnapshot::empty();
        }

        let total = guard.len();
        let successful = guard.iter().filter(|r| r.success).count();
        let failed = total - successful;
        let compliant = guard.iter().filter(|r| r.sla_compliant).count();

        let mut durations: Vec<u64> = guard.iter().map(|r| r.total_duration_ms).collect();
        durations.sort_unstable();

        let mean = durations.iter().sum::<u64>() as f64 / total as f64;
        let median = percentile(&durations, 0.5);
        let p99 = percentile(&durations, 0.99);

        MetricsSnapshot {
            total,
            successful,
            failed,
            mean_duration_ms: mean,
            median_duration_ms: median,
            p99_duration_ms: p99,
            compliance_rate: compliant as f64 / total as f64,
        }
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[u64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((sorted.len() as f64 - 1.0) * fraction).round() as usize;
    sorted[rank.min(sorted.len() - 1)] as f64
}
