//! Process-global counters for workload comparison
//!
//! The whole point of running the same workload under OCC and S2PL is to
//! compare outcomes, so every process counts the events that differ between
//! the disciplines: commits, aborts by reason, lock waits, wound aborts.
//! Exposed as JSON through the `/status` endpoint.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::error::AbortReason;

static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// The process-global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[derive(Debug)]
pub struct Metrics {
    // Coordinator-side
    txn_begun: AtomicU64,
    txn_committed: AtomicU64,
    txn_aborted: AtomicU64,
    aborts_stale_read: AtomicU64,
    aborts_deadlock: AtomicU64,
    aborts_lock_timeout: AtomicU64,
    aborts_client: AtomicU64,
    aborts_apply_failed: AtomicU64,
    aborts_expired: AtomicU64,
    history_pruned: AtomicU64,

    // Node-side
    gets: AtomicU64,
    puts: AtomicU64,
    lock_waits: AtomicU64,
    lock_wounds: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            txn_begun: AtomicU64::new(0),
            txn_committed: AtomicU64::new(0),
            txn_aborted: AtomicU64::new(0),
            aborts_stale_read: AtomicU64::new(0),
            aborts_deadlock: AtomicU64::new(0),
            aborts_lock_timeout: AtomicU64::new(0),
            aborts_client: AtomicU64::new(0),
            aborts_apply_failed: AtomicU64::new(0),
            aborts_expired: AtomicU64::new(0),
            history_pruned: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            lock_waits: AtomicU64::new(0),
            lock_wounds: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
        }
    }

    pub fn record_begin(&self) {
        self.txn_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.txn_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self, reason: AbortReason) {
        self.txn_aborted.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            AbortReason::StaleRead => &self.aborts_stale_read,
            AbortReason::DeadlockAbort => &self.aborts_deadlock,
            AbortReason::LockTimeout => &self.aborts_lock_timeout,
            AbortReason::ClientAbort => &self.aborts_client,
            AbortReason::ApplyFailed => &self.aborts_apply_failed,
            AbortReason::Expired => &self.aborts_expired,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pruned(&self, n: u64) {
        self.history_pruned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_wound(&self) {
        self.lock_wounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot for the `/status` endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            txn_begun: self.txn_begun.load(Ordering::Relaxed),
            txn_committed: self.txn_committed.load(Ordering::Relaxed),
            txn_aborted: self.txn_aborted.load(Ordering::Relaxed),
            aborts_stale_read: self.aborts_stale_read.load(Ordering::Relaxed),
            aborts_deadlock: self.aborts_deadlock.load(Ordering::Relaxed),
            aborts_lock_timeout: self.aborts_lock_timeout.load(Ordering::Relaxed),
            aborts_client: self.aborts_client.load(Ordering::Relaxed),
            aborts_apply_failed: self.aborts_apply_failed.load(Ordering::Relaxed),
            aborts_expired: self.aborts_expired.load(Ordering::Relaxed),
            history_pruned: self.history_pruned.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            lock_wounds: self.lock_wounds.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub txn_begun: u64,
    pub txn_committed: u64,
    pub txn_aborted: u64,
    pub aborts_stale_read: u64,
    pub aborts_deadlock: u64,
    pub aborts_lock_timeout: u64,
    pub aborts_client: u64,
    pub aborts_apply_failed: u64,
    pub aborts_expired: u64,
    pub history_pruned: u64,
    pub gets: u64,
    pub puts: u64,
    pub lock_waits: u64,
    pub lock_wounds: u64,
    pub lock_timeouts: u64,
}
