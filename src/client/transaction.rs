//! Transaction handle
//!
//! One handle drives one transaction from `begin` to COMMITTED or ABORTED
//! under the discipline chosen at begin time. Both disciplines buffer
//! writes locally and serve read-your-own-writes from the buffer; they
//! differ in when the cluster learns about an access:
//!
//! - OCC never contacts a node for a write and never locks for a read;
//!   the commit ships the read set and write buffer to the coordinator
//!   for backward validation.
//! - S2PL acquires the lock at first access (shared for reads, exclusive
//!   for writes), applies the buffered writes between acquisition and
//!   release at commit time, and releases everything atomically. Applying
//!   at commit means abort never needs rollback.
//!
//! A handle that aborts (or commits) is finished: every later operation
//! fails fast with `TxnFinished`.

use std::collections::{HashMap, HashSet};

use tonic::transport::Channel;

use crate::common::hash::shard_key;
use crate::common::{AbortReason, Error, Result};
use crate::node::NodeClient;
use crate::proto::coordinator_api_client::CoordinatorApiClient;
use crate::proto::{
    AbortRequest, CommitRequest, KeyValue, LockMode, LockOutcome, ValidateCommitRequest,
};

/// Concurrency-control discipline, fixed per transaction at begin time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Occ,
    S2pl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

pub struct Transaction {
    mode: Mode,
    tid: u64,
    state: TxnState,
    coordinator: CoordinatorApiClient<Channel>,
    nodes: Vec<NodeClient>,
    lock_timeout_ms: u64,
    /// Keys read from nodes (OCC validation input).
    read_set: HashSet<String>,
    /// Buffered writes, latest value per key.
    write_set: HashMap<String, Vec<u8>>,
    /// Node values already read, so repeated reads stay stable.
    read_cache: HashMap<String, Option<Vec<u8>>>,
    /// Nodes we acquired locks on (S2PL), for release at the end.
    locked_nodes: HashSet<usize>,
}

impl Transaction {
    pub(crate) fn new(
        mode: Mode,
        tid: u64,
        coordinator: CoordinatorApiClient<Channel>,
        nodes: Vec<NodeClient>,
        lock_timeout_ms: u64,
    ) -> Self {
        Self {
            mode,
            tid,
            state: TxnState::Active,
            coordinator,
            nodes,
            lock_timeout_ms,
            read_set: HashSet::new(),
            write_set: HashMap::new(),
            read_cache: HashMap::new(),
            locked_nodes: HashSet::new(),
        }
    }

    pub fn tid(&self) -> u64 {
        self.tid
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    fn shard(&self, key: &str) -> usize {
        shard_key(key, self.nodes.len() as u64) as usize
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state == TxnState::Active {
            Ok(())
        } else {
            Err(Error::TxnFinished(self.tid))
        }
    }

    /// Read a key; `None` means the key does not exist.
    pub async fn read(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_active()?;

        // Read-your-own-writes, then repeated-read stability.
        if let Some(value) = self.write_set.get(key) {
            return Ok(Some(value.clone()));
        }
        if let Some(value) = self.read_cache.get(key) {
            return Ok(value.clone());
        }

        if self.mode == Mode::S2pl {
            self.acquire(key, LockMode::Shared).await?;
        }
        let tid = match self.mode {
            Mode::Occ => 0,
            Mode::S2pl => self.tid,
        };
        let shard = self.shard(key);
        let value = match self.nodes[shard].get(key, tid).await {
            Ok(value) => value,
            Err(Error::TxnAborted { reason }) => return Err(self.fail(reason).await),
            Err(e) => return Err(e),
        };
        self.read_set.insert(key.to_string());
        self.read_cache.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Buffer a write. S2PL acquires the exclusive lock now; nothing is
    /// applied until commit under either discipline.
    pub async fn write(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_active()?;
        if self.mode == Mode::S2pl {
            self.acquire(key, LockMode::Exclusive).await?;
        }
        self.write_set.insert(key.to_string(), value);
        Ok(())
    }

    /// Commit. Returns the commit timestamp on success; on abort the
    /// handle is finished and the error carries the typed reason.
    pub async fn commit(&mut self) -> Result<u64> {
        self.ensure_active()?;
        match self.mode {
            Mode::Occ => self.commit_occ().await,
            Mode::S2pl => self.commit_s2pl().await,
        }
    }

    async fn commit_occ(&mut self) -> Result<u64> {
        let request = ValidateCommitRequest {
            tid: self.tid,
            read_keys: self.read_set.iter().cloned().collect(),
            writes: self
                .write_set
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        };
        let resp = self
            .coordinator
            .validate_commit(tonic::Request::new(request))
            .await?
            .into_inner();
        if resp.committed {
            self.state = TxnState::Committed;
            Ok(resp.commit_ts)
        } else {
            let reason: AbortReason = resp.reason().into();
            self.state = TxnState::Aborted;
            Err(Error::aborted(reason))
        }
    }

    async fn commit_s2pl(&mut self) -> Result<u64> {
        // Fence the commit on every node we hold locks on. A fence is
        // refused where wound-wait already took our locks; once every
        // fence is granted, no node will wound us until release. Writes
        // are applied only after the last fence, so an abort never
        // leaves a partial apply behind.
        let mut fenced: Vec<usize> = self.locked_nodes.iter().copied().collect();
        fenced.sort_unstable();
        for idx in fenced {
            match self.nodes[idx].lock_fence(self.tid).await {
                Ok(true) => {}
                Ok(false) => return Err(self.fail(AbortReason::DeadlockAbort).await),
                Err(e) => return Err(e),
            }
        }

        // Apply the buffered writes under our exclusive locks.
        let writes: Vec<(String, Vec<u8>)> = self
            .write_set
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in writes {
            let shard = self.shard(&key);
            match self.nodes[shard].put(&key, value, self.tid).await {
                Ok(()) => {}
                Err(Error::TxnAborted { reason }) => return Err(self.fail(reason).await),
                Err(e) => return Err(e),
            }
        }

        let request = CommitRequest {
            tid: self.tid,
            written_keys: self.write_set.keys().cloned().collect(),
        };
        let resp = self
            .coordinator
            .commit(tonic::Request::new(request))
            .await?
            .into_inner();
        if !resp.ok {
            let reason: AbortReason = resp.reason().into();
            self.state = TxnState::Aborted;
            self.release_locks().await;
            return Err(Error::aborted(reason));
        }

        self.state = TxnState::Committed;
        self.release_locks().await;
        Ok(resp.commit_ts)
    }

    /// Abort: discard local state, release locks, tell the coordinator.
    pub async fn abort(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TxnState::Aborted;
        self.read_set.clear();
        self.write_set.clear();
        self.read_cache.clear();
        self.release_locks().await;
        self.coordinator
            .abort(tonic::Request::new(AbortRequest { tid: self.tid }))
            .await?;
        Ok(())
    }

    async fn acquire(&mut self, key: &str, mode: LockMode) -> Result<()> {
        let shard = self.shard(key);
        self.locked_nodes.insert(shard);
        let outcome = self.nodes[shard]
            .lock_acquire(self.tid, key, mode, self.lock_timeout_ms)
            .await?;
        match outcome {
            LockOutcome::Granted => Ok(()),
            LockOutcome::Timeout => Err(self.fail(AbortReason::LockTimeout).await),
            LockOutcome::DeadlockAbort => Err(self.fail(AbortReason::DeadlockAbort).await),
        }
    }

    /// The cluster aborted us: finish the handle, clean up, surface why.
    async fn fail(&mut self, reason: AbortReason) -> Error {
        self.state = TxnState::Aborted;
        self.release_locks().await;
        let _ = self
            .coordinator
            .abort(tonic::Request::new(AbortRequest { tid: self.tid }))
            .await;
        Error::aborted(reason)
    }

    async fn release_locks(&mut self) {
        let nodes: Vec<usize> = self.locked_nodes.drain().collect();
        for idx in nodes {
            if let Err(e) = self.nodes[idx].lock_release_all(self.tid).await {
                tracing::warn!(tid = self.tid, node = idx, "lock release failed: {}", e);
            }
        }
    }
}
