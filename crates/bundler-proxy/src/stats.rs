//! Atomic dispatch counters.
//!
//! All atomics use `Relaxed` ordering: these are monotonic display counters
//! with no synchronization requirements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::backend::BackendVersion;

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    aggregate_responses: AtomicU64,
    v06_forwards: AtomicU64,
    v07_forwards: AtomicU64,
    fallbacks: AtomicU64,
    fanout_failures: AtomicU64,
}

/// Thread-safe dispatch statistics. Cheap to clone (Arc).
#[derive(Debug, Clone, Default)]
pub struct ProxyStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current stats values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub aggregate_responses: u64,
    pub v06_forwards: u64,
    pub v07_forwards: u64,
    pub fallbacks: u64,
    pub fanout_failures: u64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.inner.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_aggregate(&self) {
        self.inner.aggregate_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_forward(&self, backend: BackendVersion) {
        let counter = match backend {
            BackendVersion::V06 => &self.inner.v06_forwards,
            BackendVersion::V07 => &self.inner.v07_forwards,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallbacks(&self) {
        self.inner.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fanout_failures(&self) {
        self.inner.fanout_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.inner.rejected_requests.load(Ordering::Relaxed),
            aggregate_responses: self.inner.aggregate_responses.load(Ordering::Relaxed),
            v06_forwards: self.inner.v06_forwards.load(Ordering::Relaxed),
            v07_forwards: self.inner.v07_forwards.load(Ordering::Relaxed),
            fallbacks: self.inner.fallbacks.load(Ordering::Relaxed),
            fanout_failures: self.inner.fanout_failures.load(Ordering::Relaxed),
        }
    }
}
