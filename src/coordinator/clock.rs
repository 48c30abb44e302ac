//! Logical clock
//!
//! One strictly-increasing counter shared by `begin` (start timestamps /
//! TIDs) and commit-timestamp assignment. Every value issued is greater
//! than every previously issued value, across both uses; committed
//! transactions are therefore totally ordered by their commit timestamp.
//! Zero is never issued; the wire reserves tid 0 for the unlocked path.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Issue the next timestamp.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently issued timestamp (0 before any issue).
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_strictly_increasing() {
        let clock = LogicalClock::new();
        let mut prev = 0;
        for _ in 0..1000 {
            let ts = clock.next();
            assert!(ts > prev);
            prev = ts;
        }
        assert_eq!(clock.current(), prev);
    }

    #[test]
    fn test_unique_across_threads() {
        let clock = Arc::new(LogicalClock::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let clock = clock.clone();
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| clock.next()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 1000);
    }
}
