//! S2PL lock table with wound-wait deadlock prevention
//!
//! One exclusive holder or any number of shared holders per key; blocked
//! requests park on a per-key FIFO queue. Conflicts resolve by wound-wait:
//! an older requester (lower TID) aborts every younger conflicting holder
//! and takes its place in line, a younger requester waits. Waits therefore
//! only ever target older transactions, so the request-time wait-for graph
//! is acyclic; the per-request timeout bounds the residual cases, and every
//! acquisition terminates in GRANTED, TIMEOUT or DEADLOCK_ABORT.
//!
//! A wounded transaction stays marked until `release_all`: its in-flight
//! waits complete with DEADLOCK_ABORT and the node rejects its reads and
//! writes until it has cleaned up.
//!
//! A transaction that reaches its commit point fences itself with
//! `begin_commit`: the fence is refused if the transaction was already
//! wounded, and once granted the table refuses to wound it, so conflicting
//! requesters wait instead. A fenced transaction acquires nothing further
//! and releases promptly, so waiting on it stays bounded and the wait-for
//! graph gains no cycles.
//!
//! The table mutex is never held across an await; waiters park on oneshot
//! channels and are completed by whoever releases or wounds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::common::metrics::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// How a lock acquisition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Granted,
    Timeout,
    DeadlockAbort,
}

fn compatible(req: LockMode, held: LockMode) -> bool {
    req == LockMode::Shared && held == LockMode::Shared
}

struct Waiter {
    tid: u64,
    mode: LockMode,
    tx: oneshot::Sender<LockOutcome>,
}

#[derive(Default)]
struct LockState {
    /// One (tid, Exclusive) or any number of (tid, Shared).
    holders: Vec<(u64, LockMode)>,
    waiters: VecDeque<Waiter>,
}

#[derive(Default)]
struct TableInner {
    locks: HashMap<String, LockState>,
    /// tid -> keys it holds, so release_all is proportional to what was held.
    held: HashMap<u64, HashSet<String>>,
    /// tid -> keys it has queued waiters on.
    waiting: HashMap<u64, HashSet<String>>,
    wounded: HashSet<u64>,
    /// Commit-fenced tids; exempt from wounding until release_all.
    committing: HashSet<u64>,
}

impl TableInner {
    fn holds(&self, tid: u64, key: &str, need: LockMode) -> bool {
        self.locks.get(key).is_some_and(|state| {
            state
                .holders
                .iter()
                .any(|(h, m)| *h == tid && (*m == LockMode::Exclusive || need == LockMode::Shared))
        })
    }

    fn grant(&mut self, key: &str, tid: u64, mode: LockMode) {
        let state = self.locks.entry(key.to_string()).or_default();
        if let Some(hold) = state.holders.iter_mut().find(|(h, _)| *h == tid) {
            if mode == LockMode::Exclusive {
                hold.1 = LockMode::Exclusive;
            }
        } else {
            state.holders.push((tid, mode));
            self.held.entry(tid).or_default().insert(key.to_string());
        }
    }

    /// Abort `victim` in place: drop its locks, fail its pending waits,
    /// and reject its operations until it calls release_all. Returns the
    /// keys whose holder set shrank.
    fn wound(&mut self, victim: u64) -> Vec<String> {
        self.wounded.insert(victim);
        metrics().record_lock_wound();

        let mut freed = Vec::new();
        if let Some(keys) = self.held.remove(&victim) {
            for key in keys {
                if let Some(state) = self.locks.get_mut(&key) {
                    state.holders.retain(|(h, _)| *h != victim);
                }
                freed.push(key);
            }
        }
        if let Some(keys) = self.waiting.remove(&victim) {
            for key in keys {
                if let Some(state) = self.locks.get_mut(&key) {
                    let mut i = 0;
                    while i < state.waiters.len() {
                        if state.waiters[i].tid == victim {
                            let waiter = state.waiters.remove(i).unwrap();
                            let _ = waiter.tx.send(LockOutcome::DeadlockAbort);
                        } else {
                            i += 1;
                        }
                    }
                }
                // The victim's waiter may have been the blocked front;
                // whoever queued behind it needs a promotion pass too.
                freed.push(key);
            }
        }
        freed
    }

    /// Grant queued waiters in FIFO order while the holder set allows it:
    /// a run of shared waiters, one exclusive waiter, or a sole-holder
    /// upgrade.
    fn promote(&mut self, key: &str) {
        loop {
            let next = {
                let Some(state) = self.locks.get_mut(key) else {
                    return;
                };
                let Some(front) = state.waiters.front() else {
                    break;
                };
                let blocked = state
                    .holders
                    .iter()
                    .any(|(h, m)| *h != front.tid && !compatible(front.mode, *m));
                if blocked {
                    break;
                }
                state.waiters.pop_front().unwrap()
            };

            if let Some(keys) = self.waiting.get_mut(&next.tid) {
                keys.remove(key);
                if keys.is_empty() {
                    self.waiting.remove(&next.tid);
                }
            }
            self.grant(key, next.tid, next.mode);
            // A failed send means the waiter timed out concurrently; it
            // re-checks the holder set before reporting TIMEOUT.
            let _ = next.tx.send(LockOutcome::Granted);
            if next.mode == LockMode::Exclusive {
                break;
            }
        }
        self.cleanup(key);
    }

    fn remove_waiter(&mut self, tid: u64, key: &str) {
        if let Some(state) = self.locks.get_mut(key) {
            state.waiters.retain(|w| w.tid != tid);
        }
        if let Some(keys) = self.waiting.get_mut(&tid) {
            keys.remove(key);
            if keys.is_empty() {
                self.waiting.remove(&tid);
            }
        }
    }

    fn cleanup(&mut self, key: &str) {
        if let Some(state) = self.locks.get(key) {
            if state.holders.is_empty() && state.waiters.is_empty() {
                self.locks.remove(key);
            }
        }
    }
}

pub struct LockTable {
    inner: Mutex<TableInner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
        }
    }

    /// Acquire `key` in `mode` for `tid`, waiting up to `timeout`.
    pub async fn acquire(
        &self,
        tid: u64,
        key: &str,
        mode: LockMode,
        timeout: Duration,
    ) -> LockOutcome {
        let rx = {
            let mut inner = self.inner.lock().unwrap();
            if inner.wounded.contains(&tid) {
                return LockOutcome::DeadlockAbort;
            }
            match Self::try_acquire(&mut inner, tid, key, mode) {
                None => return LockOutcome::Granted,
                Some(rx) => rx,
            }
        };

        metrics().record_lock_wait();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped: the table entry vanished under us.
            Ok(Err(_)) => LockOutcome::DeadlockAbort,
            Err(_) => {
                let mut inner = self.inner.lock().unwrap();
                if inner.wounded.contains(&tid) {
                    inner.remove_waiter(tid, key);
                    inner.promote(key);
                    return LockOutcome::DeadlockAbort;
                }
                if inner.holds(tid, key, mode) {
                    // The grant raced the timer; honor it.
                    return LockOutcome::Granted;
                }
                // Our queue slot may have blocked compatible waiters
                // behind it; give them a promotion pass on the way out.
                inner.remove_waiter(tid, key);
                inner.promote(key);
                metrics().record_lock_timeout();
                LockOutcome::Timeout
            }
        }
    }

    /// Returns `None` when granted synchronously, otherwise the channel the
    /// caller must wait on.
    fn try_acquire(
        inner: &mut TableInner,
        tid: u64,
        key: &str,
        mode: LockMode,
    ) -> Option<oneshot::Receiver<LockOutcome>> {
        // Re-acquisition in a covered mode.
        if inner.holds(tid, key, mode) {
            return None;
        }

        // Shared -> exclusive upgrade, permitted when sole holder.
        {
            let state = inner.locks.entry(key.to_string()).or_default();
            if state.holders.len() == 1 && state.holders[0].0 == tid {
                state.holders[0].1 = LockMode::Exclusive;
                return None;
            }
        }

        // Wound-wait: abort every younger conflicting holder, except those
        // fenced for commit; the requester waits those out instead.
        let younger: Vec<u64> = inner
            .locks
            .get(key)
            .map(|state| {
                state
                    .holders
                    .iter()
                    .filter(|(h, m)| {
                        *h != tid
                            && *h > tid
                            && !compatible(mode, *m)
                            && !inner.committing.contains(h)
                    })
                    .map(|(h, _)| *h)
                    .collect()
            })
            .unwrap_or_default();
        let mut freed = Vec::new();
        for victim in younger {
            freed.extend(inner.wound(victim));
        }
        for other in freed.iter().filter(|k| k.as_str() != key) {
            inner.promote(other);
        }

        // Older conflicting holders remain? Then we wait our turn.
        let still_conflicting = inner
            .locks
            .get(key)
            .is_some_and(|state| {
                state
                    .holders
                    .iter()
                    .any(|(h, m)| *h != tid && !compatible(mode, *m))
            });
        if !still_conflicting {
            inner.grant(key, tid, mode);
            inner.promote(key);
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let state = inner.locks.entry(key.to_string()).or_default();
        state.waiters.push_back(Waiter { tid, mode, tx });
        inner.waiting.entry(tid).or_default().insert(key.to_string());
        Some(rx)
    }

    /// Fence `tid` for commit. Refused when the tid was already wounded;
    /// once granted, the table will not wound `tid` until `release_all`,
    /// so every lock it holds stays held through its write apply.
    pub fn begin_commit(&self, tid: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.wounded.contains(&tid) {
            return false;
        }
        inner.committing.insert(tid);
        true
    }

    /// Drop every lock and queued wait belonging to `tid`, clear its
    /// wounded and commit-fence markers, and promote whatever became
    /// grantable.
    pub fn release_all(&self, tid: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.wounded.remove(&tid);
        inner.committing.remove(&tid);

        let held: Vec<String> = inner.held.remove(&tid).into_iter().flatten().collect();
        for key in &held {
            if let Some(state) = inner.locks.get_mut(key) {
                state.holders.retain(|(h, _)| *h != tid);
            }
        }

        let waited: Vec<String> = inner.waiting.remove(&tid).into_iter().flatten().collect();
        for key in &waited {
            if let Some(state) = inner.locks.get_mut(key) {
                let mut i = 0;
                while i < state.waiters.len() {
                    if state.waiters[i].tid == tid {
                        let waiter = state.waiters.remove(i).unwrap();
                        let _ = waiter.tx.send(LockOutcome::DeadlockAbort);
                    } else {
                        i += 1;
                    }
                }
            }
        }

        for key in held.iter().chain(waited.iter()) {
            inner.promote(key);
        }
    }

    /// Does `tid` hold `key` in a mode covering `need`?
    pub fn holds(&self, tid: u64, key: &str, need: LockMode) -> bool {
        self.inner.lock().unwrap().holds(tid, key, need)
    }

    /// Has `tid` been aborted by wound-wait (and not yet released)?
    pub fn is_wounded(&self, tid: u64) -> bool {
        self.inner.lock().unwrap().wounded.contains(&tid)
    }

    pub fn stats(&self) -> LockTableStats {
        let inner = self.inner.lock().unwrap();
        LockTableStats {
            locked_keys: inner.locks.len(),
            holders: inner.locks.values().map(|s| s.holders.len()).sum(),
            waiters: inner.locks.values().map(|s| s.waiters.len()).sum(),
            wounded: inner.wounded.len(),
            committing: inner.committing.len(),
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LockTableStats {
    pub locked_keys: usize,
    pub holders: usize,
    pub waiters: usize,
    pub wounded: usize,
    pub committing: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_acquire_free_lock() {
        let table = LockTable::new();
        let outcome = table.acquire(1, "key", LockMode::Exclusive, WAIT).await;
        assert_eq!(outcome, LockOutcome::Granted);
        assert!(table.holds(1, "key", LockMode::Exclusive));
    }

    #[tokio::test]
    async fn test_shared_locks_compatible() {
        let table = LockTable::new();
        assert_eq!(
            table.acquire(1, "key", LockMode::Shared, WAIT).await,
            LockOutcome::Granted
        );
        assert_eq!(
            table.acquire(2, "key", LockMode::Shared, WAIT).await,
            LockOutcome::Granted
        );
        assert!(table.holds(1, "key", LockMode::Shared));
        assert!(table.holds(2, "key", LockMode::Shared));
        assert!(!table.holds(1, "key", LockMode::Exclusive));
    }

    #[tokio::test]
    async fn test_reacquire_and_sole_upgrade() {
        let table = LockTable::new();
        assert_eq!(
            table.acquire(1, "key", LockMode::Shared, WAIT).await,
            LockOutcome::Granted
        );
        assert_eq!(
            table.acquire(1, "key", LockMode::Shared, WAIT).await,
            LockOutcome::Granted
        );
        // Sole shared holder upgrades in place.
        assert_eq!(
            table.acquire(1, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        assert!(table.holds(1, "key", LockMode::Exclusive));
    }

    #[tokio::test]
    async fn test_older_wounds_younger_holder() {
        let table = LockTable::new();
        assert_eq!(
            table.acquire(9, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        // Older transaction (lower tid) takes the lock straight away.
        assert_eq!(
            table.acquire(3, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        assert!(table.holds(3, "key", LockMode::Exclusive));
        assert!(!table.holds(9, "key", LockMode::Exclusive));
        assert!(table.is_wounded(9));
        // The victim is rejected until it releases.
        assert_eq!(
            table.acquire(9, "other", LockMode::Shared, WAIT).await,
            LockOutcome::DeadlockAbort
        );
        table.release_all(9);
        assert!(!table.is_wounded(9));
    }

    #[tokio::test]
    async fn test_younger_waits_until_release() {
        let table = Arc::new(LockTable::new());
        assert_eq!(
            table.acquire(1, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(5, "key", LockMode::Exclusive, WAIT).await })
        };
        // Give the waiter time to enqueue, then release.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(table.stats().waiters, 1);
        table.release_all(1);

        assert_eq!(waiter.await.unwrap(), LockOutcome::Granted);
        assert!(table.holds(5, "key", LockMode::Exclusive));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let table = LockTable::new();
        assert_eq!(
            table.acquire(1, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        let outcome = table
            .acquire(5, "key", LockMode::Shared, Duration::from_millis(50))
            .await;
        assert_eq!(outcome, LockOutcome::Timeout);
        // The timed-out waiter left the queue.
        assert_eq!(table.stats().waiters, 0);
    }

    #[tokio::test]
    async fn test_wound_completes_pending_wait() {
        let table = Arc::new(LockTable::new());
        // tid 5 holds "a"; tid 9 holds "b" and queues on "a".
        assert_eq!(
            table.acquire(5, "a", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        assert_eq!(
            table.acquire(9, "b", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        let blocked = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(9, "a", LockMode::Exclusive, WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // tid 5 now conflicts with the younger tid 9 on "b": 9 is wounded,
        // which also fails its queued wait on "a".
        assert_eq!(
            table.acquire(5, "b", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        assert_eq!(blocked.await.unwrap(), LockOutcome::DeadlockAbort);
        assert!(table.is_wounded(9));
    }

    #[tokio::test]
    async fn test_commit_fence_blocks_wound() {
        let table = Arc::new(LockTable::new());
        assert_eq!(
            table.acquire(9, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        assert!(table.begin_commit(9));
        assert_eq!(table.stats().committing, 1);

        // An older conflicting request waits the fenced holder out
        // instead of wounding it.
        let older = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(3, "key", LockMode::Exclusive, WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!table.is_wounded(9));
        assert!(table.holds(9, "key", LockMode::Exclusive));
        assert_eq!(table.stats().waiters, 1);

        table.release_all(9);
        assert_eq!(older.await.unwrap(), LockOutcome::Granted);
        assert!(table.holds(3, "key", LockMode::Exclusive));
        assert_eq!(table.stats().committing, 0);
    }

    #[tokio::test]
    async fn test_commit_fence_refused_once_wounded() {
        let table = LockTable::new();
        assert_eq!(
            table.acquire(9, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        // Older transaction wounds 9 before it reaches its commit point.
        assert_eq!(
            table.acquire(3, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        assert!(!table.begin_commit(9));
        table.release_all(9);
        assert_eq!(table.stats().committing, 0);
    }

    #[tokio::test]
    async fn test_upgrade_with_co_holder_waits() {
        let table = Arc::new(LockTable::new());
        assert_eq!(
            table.acquire(1, "key", LockMode::Shared, WAIT).await,
            LockOutcome::Granted
        );
        assert_eq!(
            table.acquire(5, "key", LockMode::Shared, WAIT).await,
            LockOutcome::Granted
        );

        // tid 5 wants to upgrade but tid 1 (older) still reads.
        let upgrading = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(5, "key", LockMode::Exclusive, WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!table.holds(5, "key", LockMode::Exclusive));

        table.release_all(1);
        assert_eq!(upgrading.await.unwrap(), LockOutcome::Granted);
        assert!(table.holds(5, "key", LockMode::Exclusive));
    }

    #[tokio::test]
    async fn test_release_promotes_in_queue_order() {
        let table = Arc::new(LockTable::new());
        assert_eq!(
            table.acquire(1, "key", LockMode::Exclusive, WAIT).await,
            LockOutcome::Granted
        );
        let first = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(5, "key", LockMode::Shared, WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(6, "key", LockMode::Shared, WAIT).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        table.release_all(1);
        // Both shared waiters ride the same promotion.
        assert_eq!(first.await.unwrap(), LockOutcome::Granted);
        assert_eq!(second.await.unwrap(), LockOutcome::Granted);
        assert!(table.holds(5, "key", LockMode::Shared));
        assert!(table.holds(6, "key", LockMode::Shared));
    }
}
