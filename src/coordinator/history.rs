//! Committed-transaction history and the live-transaction registry
//!
//! The history answers one question during backward validation: which keys
//! were written by transactions that committed after a given start
//! timestamp. It is keyed by commit timestamp so that query is a range
//! scan, and it is bounded: records at or below the oldest live start
//! timestamp can never be consulted again and are pruned.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

/// One committed transaction, without value payloads: the authoritative
/// values live in the data nodes after the write phase.
#[derive(Debug, Clone)]
pub struct CommittedTxn {
    pub tid: u64,
    pub ts_commit: u64,
    pub written_keys: HashSet<String>,
}

#[derive(Default)]
pub struct CommitHistory {
    records: BTreeMap<u64, CommittedTxn>,
}

impl CommitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, tid: u64, ts_commit: u64, written_keys: HashSet<String>) {
        self.records.insert(
            ts_commit,
            CommittedTxn {
                tid,
                ts_commit,
                written_keys,
            },
        );
    }

    /// Backward validation: did any transaction with `ts_commit > ts_start`
    /// write a key in `read_set`?
    pub fn has_conflict(&self, ts_start: u64, read_set: &HashSet<String>) -> bool {
        self.records
            .range(ts_start + 1..)
            .any(|(_, txn)| !read_set.is_disjoint(&txn.written_keys))
    }

    /// Drop every record with `ts_commit <= ts_low`. Returns how many.
    pub fn prune_upto(&mut self, ts_low: u64) -> usize {
        let keep = match ts_low.checked_add(1) {
            Some(bound) => self.records.split_off(&bound),
            None => BTreeMap::new(),
        };
        let pruned = self.records.len();
        self.records = keep;
        pruned
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Start timestamps of transactions that have begun but not yet finished.
/// The minimum is the pruning floor; optionally, entries older than a
/// configured age are expired so a stuck client cannot pin the history.
#[derive(Default)]
pub struct LiveSet {
    active: BTreeMap<u64, Instant>,
    expired: HashSet<u64>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tid: u64, now: Instant) {
        self.active.insert(tid, now);
    }

    pub fn deregister(&mut self, tid: u64) -> bool {
        self.active.remove(&tid).is_some()
    }

    /// Minimum live start timestamp, `None` when nothing is live.
    pub fn ts_low(&self) -> Option<u64> {
        self.active.keys().next().copied()
    }

    /// Consume an expiry marker for `tid`, if one was set.
    pub fn take_expired(&mut self, tid: u64) -> bool {
        self.expired.remove(&tid)
    }

    /// Move every transaction older than `max_age` to the expired set.
    pub fn expire_older_than(&mut self, max_age: Duration, now: Instant) -> Vec<u64> {
        let victims: Vec<u64> = self
            .active
            .iter()
            .filter(|(_, started)| now.duration_since(**started) > max_age)
            .map(|(tid, _)| *tid)
            .collect();
        for tid in &victims {
            self.active.remove(tid);
            self.expired.insert(*tid);
        }
        victims
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
