/*!
 * Enrollment interval history and the "active at T" rule
 *
 * Each (provider, network) pair owns a history of intervals sorted by effective
 * timestamp. Ingestion is expected to keep those intervals disjoint, but queries
 * do not rely on it: when several intervals cover the reference time, the one
 * with the latest effective timestamp wins and the overlap is reported through
 * [`Diagnostics`].
 */

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data_types::{NetworkId, ProviderId};

/// A single enrollment interval `[effective, termination)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub effective: DateTime<Utc>,
    pub termination: Option<DateTime<Utc>>,
    /// Position of the source row in the snapshot's enrollment table
    pub row: usize,
}

impl Interval {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.effective <= at && self.termination.map_or(true, |end| at < end)
    }
}

/// Result of an "active at T" lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveAt {
    Inactive,
    Active(Interval),
    /// More than one interval covers T; `selected` has the latest effective timestamp
    Overlapping { selected: Interval, covering: usize },
}

impl ActiveAt {
    pub fn is_active(&self) -> bool {
        !matches!(self, ActiveAt::Inactive)
    }

    pub fn interval(&self) -> Option<Interval> {
        match self {
            ActiveAt::Inactive => None,
            ActiveAt::Active(iv) => Some(*iv),
            ActiveAt::Overlapping { selected, .. } => Some(*selected),
        }
    }
}

/// Sorted interval history for one (provider, network) key
#[derive(Debug, Clone)]
pub struct EnrollmentHistory {
    network: NetworkId,
    intervals: Vec<Interval>,
}

impl EnrollmentHistory {
    pub fn new(network: NetworkId) -> Self {
        Self { network, intervals: Vec::new() }
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn push(&mut self, interval: Interval) {
        self.intervals.push(interval);
    }

    /// Sort by effective timestamp; ties keep source row order
    pub fn finish(&mut self) {
        self.intervals.sort_by_key(|iv| (iv.effective, iv.row));
    }

    /// Whether any two intervals in this history overlap
    pub fn has_overlap(&self) -> bool {
        let mut reach: Option<DateTime<Utc>> = None;
        let mut open = false;
        for (i, iv) in self.intervals.iter().enumerate() {
            if i > 0 && (open || reach.map_or(false, |end| iv.effective < end)) {
                return true;
            }
            match iv.termination {
                None => open = true,
                Some(t) => reach = Some(reach.map_or(t, |r| r.max(t))),
            }
        }
        false
    }

    /// Look up the interval covering `at`.
    ///
    /// Only intervals with `effective <= at` can cover `at`, so the scan is bounded
    /// by a binary search and walks that prefix from the latest start backwards.
    pub fn active_at(&self, at: DateTime<Utc>) -> ActiveAt {
        let started = self.intervals.partition_point(|iv| iv.effective <= at);
        let mut covering = self.intervals[..started].iter().rev().filter(|iv| iv.contains(at));

        let Some(selected) = covering.next() else {
            return ActiveAt::Inactive;
        };
        let others = covering.count();
        if others == 0 {
            ActiveAt::Active(*selected)
        } else {
            ActiveAt::Overlapping { selected: *selected, covering: others + 1 }
        }
    }
}

/// An overlap observed while answering a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapAnomaly {
    pub provider_id: ProviderId,
    pub network_id: NetworkId,
    pub as_of: DateTime<Utc>,
    /// Number of intervals covering `as_of`
    pub covering: usize,
    pub selected_effective: DateTime<Utc>,
}

/// Thread-safe sink for query anomalies.
///
/// Queries running on several rayon workers append to the same sink. Entries
/// from one query are sorted before they are handed back so the report does not
/// depend on scheduling.
#[derive(Debug, Default)]
pub struct Diagnostics {
    anomalies: Mutex<Vec<OverlapAnomaly>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, anomaly: OverlapAnomaly) {
        tracing::warn!(
            provider_id = %anomaly.provider_id,
            network_id = %anomaly.network_id,
            covering = anomaly.covering,
            "overlapping enrollment intervals, using the latest effective date"
        );
        self.entries().push(anomaly);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded entries stay readable after a panicking holder poisons the lock
    fn entries(&self) -> MutexGuard<'_, Vec<OverlapAnomaly>> {
        self.anomalies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drain recorded anomalies, deduplicated and in a stable order
    pub fn take(&self) -> Vec<OverlapAnomaly> {
        let mut drained = std::mem::take(&mut *self.entries());
        drained.sort_by(|a, b| {
            (&a.provider_id, a.network_id, a.as_of).cmp(&(&b.provider_id, b.network_id, b.as_of))
        });
        drained.dedup();
        drained
    }
}
