//! Dispatcher counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct DispatcherStats {
    requests: AtomicU64,
    coalesced: AtomicU64,
    tasks_spawned: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    deliveries: AtomicU64,
    deliveries_suppressed: AtomicU64,
}

impl DispatcherStats {
    pub fn record_request(&self, coalesced: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if coalesced {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_spawn(&self) {
        self.tasks_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self, count: usize) {
        self.deliveries_suppressed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, in_flight: usize) -> DispatcherStatistics {
        DispatcherStatistics {
            requests: self.requests.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            deliveries_suppressed: self.deliveries_suppressed.load(Ordering::Relaxed),
            in_flight,
        }
    }
}

/// Point-in-time dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatistics {
    pub requests: u64,
    /// Requests that joined an in-flight task
    pub coalesced: u64,
    pub tasks_spawned: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub deliveries: u64,
    /// Receivers detached or bound to a destroyed context at delivery time
    pub deliveries_suppressed: u64,
    pub in_flight: usize,
}
