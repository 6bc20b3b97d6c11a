//! Injected counter sink for process-wide observability.
//!
//! Counters are passed in rather than kept as module-level state, so
//! schedulers stay testable in isolation, following the same
//! dependency-injection style used for threading shared state through
//! the rest of this crate instead of reaching for statics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters a [`crate::scheduler::JobScheduler`] reports into.
///
/// Injected rather than kept as module-level state (spec.md §9 "Global
/// counters"), so a caller can hand the same sink to several schedulers —
/// e.g. one per priority — for process-wide aggregation instead of summing
/// each scheduler's [`crate::scheduler::SchedulerStats`] after the fact.
pub trait SchedulerMetrics: Send + Sync {
    /// A job completed successfully.
    fn record_success(&self);
    /// A job was dropped as [`crate::job::ClassifiedError::Blackhole`].
    fn record_blackhole(&self);
    /// A job was re-queued as [`crate::job::ClassifiedError::Rejected`].
    fn record_rejected(&self);
    /// A job raised [`crate::job::ClassifiedError::Other`].
    fn record_error(&self);
    /// Point-in-time read of all counters.
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Point-in-time snapshot of a [`SchedulerMetrics`] sink's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Completed jobs.
    pub success: u64,
    /// Blackholed jobs.
    pub blackhole: u64,
    /// Jobs bounced through the error queue via transient rejection.
    pub rejected: u64,
    /// Jobs that raised an "Other" classified error (may still retry).
    pub error: u64,
}

/// Lock-free [`SchedulerMetrics`] implementation backed by atomics.
#[derive(Default)]
pub struct AtomicMetrics {
    success: AtomicU64,
    blackhole: AtomicU64,
    rejected: AtomicU64,
    error: AtomicU64,
}

impl AtomicMetrics {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all counters at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            blackhole: self.blackhole.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }
}

impl SchedulerMetrics for AtomicMetrics {
    fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    fn record_blackhole(&self) {
        self.blackhole.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        AtomicMetrics::snapshot(self)
    }
}
