//! In-memory shard store
//!
//! One node owns one shard of the key space. The mapping is split across
//! buckets, each behind its own mutex, so operations on disjoint keys do
//! not serialize against each other. Per-key atomicity is all the OCC path
//! needs: concurrent puts on one key serialize on the bucket mutex, and a
//! get observes either the prior or the next value, never a torn one.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

pub struct ShardStore {
    buckets: Vec<Mutex<HashMap<String, Vec<u8>>>>,
}

impl ShardStore {
    pub fn new(num_buckets: usize) -> Self {
        let num_buckets = num_buckets.max(1);
        Self {
            buckets: (0..num_buckets).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn bucket(&self, key: &str) -> &Mutex<HashMap<String, Vec<u8>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.buckets[hasher.finish() as usize % self.buckets.len()]
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.bucket(key).lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: Vec<u8>) {
        self.bucket(key).lock().unwrap().insert(key.to_string(), value);
    }

    /// Number of keys stored across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ShardStore {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_put() {
        let store = ShardStore::new(4);
        assert_eq!(store.get("missing"), None);
        store.put("k", b"v1".to_vec());
        assert_eq!(store.get("k").unwrap(), b"v1");
        store.put("k", b"v2".to_vec());
        assert_eq!(store.get("k").unwrap(), b"v2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_puts_last_writer_wins() {
        let store = Arc::new(ShardStore::new(16));
        let mut handles = Vec::new();
        for t in 0..8u8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    store.put("contended", vec![t, i]);
                    store.put(&format!("own_{}", t), vec![i]);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // Some complete write won, and never a torn value.
        let v = store.get("contended").unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[1], 99);
        assert_eq!(store.len(), 9);
    }
}
