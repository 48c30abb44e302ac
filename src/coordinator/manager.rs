//! Transaction manager: timestamps, validation, write phase
//!
//! The manager owns the logical clock, the committed history and the live
//! registry. OCC commits run backward validation inside one critical
//! section that also covers commit-timestamp assignment, the write phase
//! and the history append. Validation is serial; the coordinator is a
//! single process and a known bottleneck.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::common::hash::shard_key;
use crate::common::metrics::metrics;
use crate::common::{AbortReason, CoordinatorConfig, Error, Result};
use crate::coordinator::clock::LogicalClock;
use crate::coordinator::history::{CommitHistory, LiveSet};
use crate::node::NodeClient;

/// Result of a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(u64),
    Aborted(AbortReason),
}

pub struct TxnManager {
    clock: LogicalClock,
    /// Node clients in shard order.
    nodes: Vec<NodeClient>,
    /// Validation critical section; guards the history.
    history: Mutex<CommitHistory>,
    live: std::sync::Mutex<LiveSet>,
    write_retries: usize,
    retry_delay: Duration,
}

impl TxnManager {
    /// Connect to every data node listed in the config, in shard order.
    pub async fn connect(config: &CoordinatorConfig) -> Result<Self> {
        let mut nodes = Vec::with_capacity(config.nodes.len());
        for addr in &config.nodes {
            let client = NodeClient::connect(addr.clone()).await?;
            tracing::info!("Connected to node {}", addr);
            nodes.push(client);
        }
        Ok(Self::new(nodes, config))
    }

    pub fn new(nodes: Vec<NodeClient>, config: &CoordinatorConfig) -> Self {
        Self {
            clock: LogicalClock::new(),
            nodes,
            history: Mutex::new(CommitHistory::new()),
            live: std::sync::Mutex::new(LiveSet::new()),
            write_retries: config.write_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Start a transaction: issue its TID (= start timestamp) and register
    /// it live so pruning stays behind it. Issuance and registration happen
    /// under one lock: a pruning pass that observes the live set either runs
    /// before the TID exists (everything it prunes predates the TID) or
    /// after the TID is registered (the floor keeps its records).
    pub fn begin(&self) -> u64 {
        let tid = {
            let mut live = self.live.lock().unwrap();
            let tid = self.clock.next();
            live.register(tid, Instant::now());
            tid
        };
        metrics().record_begin();
        tracing::debug!(tid, "transaction begun");
        tid
    }

    /// OCC commit: backward validation, commit-timestamp assignment, write
    /// phase and history append, all under the validation lock.
    pub async fn validate_and_commit(
        &self,
        tid: u64,
        read_set: HashSet<String>,
        writes: HashMap<String, Vec<u8>>,
    ) -> CommitOutcome {
        if self.live.lock().unwrap().take_expired(tid) {
            metrics().record_abort(AbortReason::Expired);
            return CommitOutcome::Aborted(AbortReason::Expired);
        }

        let mut history = self.history.lock().await;

        if history.has_conflict(tid, &read_set) {
            drop(history);
            self.finish(tid);
            metrics().record_abort(AbortReason::StaleRead);
            tracing::debug!(tid, "validation failed: stale read");
            return CommitOutcome::Aborted(AbortReason::StaleRead);
        }

        let ts_commit = self.clock.next();
        let applied = self.apply_writes(tid, &writes).await;
        history.append(tid, ts_commit, writes.into_keys().collect());
        drop(history);
        self.finish(tid);

        match applied {
            Ok(()) => {
                metrics().record_commit();
                tracing::debug!(tid, ts_commit, "transaction committed");
                CommitOutcome::Committed(ts_commit)
            }
            Err(e) => {
                // The commit timestamp is assigned, so the transaction is
                // logically committed and the record stays in history; the
                // unapplied write is a node-local inconsistency to surface.
                metrics().record_abort(AbortReason::ApplyFailed);
                tracing::error!(tid, ts_commit, "write phase failed: {}", e);
                CommitOutcome::Aborted(AbortReason::ApplyFailed)
            }
        }
    }

    /// S2PL commit: the client already applied its writes under exclusive
    /// locks, so this only assigns the commit timestamp and records the
    /// written keys (concurrent OCC validation must see S2PL writers too).
    pub async fn commit_locked(&self, tid: u64, written_keys: HashSet<String>) -> CommitOutcome {
        if self.live.lock().unwrap().take_expired(tid) {
            metrics().record_abort(AbortReason::Expired);
            return CommitOutcome::Aborted(AbortReason::Expired);
        }

        let mut history = self.history.lock().await;
        let ts_commit = self.clock.next();
        history.append(tid, ts_commit, written_keys);
        drop(history);
        self.finish(tid);

        metrics().record_commit();
        tracing::debug!(tid, ts_commit, "locked transaction committed");
        CommitOutcome::Committed(ts_commit)
    }

    pub fn abort(&self, tid: u64) {
        self.live.lock().unwrap().take_expired(tid);
        self.finish(tid);
        metrics().record_abort(AbortReason::ClientAbort);
        tracing::debug!(tid, "transaction aborted");
    }

    fn finish(&self, tid: u64) {
        self.live.lock().unwrap().deregister(tid);
    }

    /// Write phase: fan writes out to their shards in parallel, with a
    /// bounded per-put retry.
    async fn apply_writes(&self, tid: u64, writes: &HashMap<String, Vec<u8>>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let num_nodes = self.nodes.len() as u64;
        let mut by_shard: HashMap<usize, Vec<(String, Vec<u8>)>> = HashMap::new();
        for (key, value) in writes {
            let shard = shard_key(key, num_nodes) as usize;
            by_shard
                .entry(shard)
                .or_default()
                .push((key.clone(), value.clone()));
        }

        let mut handles: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(by_shard.len());
        for (shard, batch) in by_shard {
            let mut client = self.nodes[shard].clone();
            let retries = self.write_retries;
            let delay = self.retry_delay;
            handles.push(tokio::spawn(async move {
                for (key, value) in batch {
                    let mut attempt = 0;
                    loop {
                        match client.put(&key, value.clone(), 0).await {
                            Ok(()) => break,
                            Err(e) if attempt < retries => {
                                attempt += 1;
                                tracing::warn!(
                                    tid,
                                    shard,
                                    key = %key,
                                    attempt,
                                    "write-phase put failed, retrying: {}",
                                    e
                                );
                                tokio::time::sleep(delay).await;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle
                .await
                .map_err(|e| Error::Internal(format!("write task panicked: {}", e)))??;
        }
        Ok(())
    }

    /// One pruning pass: expire overage transactions (when configured),
    /// then drop history below the live floor. Serialized against
    /// validation by the history lock.
    pub async fn prune_once(&self, max_txn_age: Option<Duration>) -> usize {
        let mut history = self.history.lock().await;
        let ts_low = {
            let mut live = self.live.lock().unwrap();
            if let Some(max_age) = max_txn_age {
                for tid in live.expire_older_than(max_age, Instant::now()) {
                    tracing::warn!(tid, "expiring transaction past age bound");
                }
            }
            live.ts_low()
        };
        // A live transaction with ts_start = ts_low only ever consults
        // records with ts_commit > ts_low, so everything at or below the
        // floor is unreachable. No floor means the whole history is.
        let pruned = history.prune_upto(ts_low.unwrap_or(u64::MAX));
        if pruned > 0 {
            metrics().record_pruned(pruned as u64);
            tracing::debug!(pruned, "history pruned");
        }
        pruned
    }

    /// Background pruning loop, in the shape of the node's store upkeep:
    /// spawn and forget, the handle only matters on shutdown.
    pub fn start_gc(
        self: Arc<Self>,
        interval: Duration,
        max_txn_age: Option<Duration>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.prune_once(max_txn_age).await;
            }
        })
    }

    // Status accessors

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn last_timestamp(&self) -> u64 {
        self.clock.current()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
