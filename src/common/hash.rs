//! Hashing utilities for duokv
//!
//! Shard placement must be deterministic across processes: the client, the
//! coordinator and every test harness compute the same `shard(key)`.
//! BLAKE3 gives us a stable hash independent of the process' SipHash keys.

/// Compute the shard index for a key.
pub fn shard_key(key: &str, num_shards: u64) -> u64 {
    let hash = blake3::hash(key.as_bytes());
    let hash_u64 = u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap());
    hash_u64 % num_shards
}

/// Find a key that lands on the given shard, by suffixing a counter.
///
/// Test/demo helper: scenarios like "write one key per node" need keys with
/// known placement.
pub fn key_on_shard(prefix: &str, shard: u64, num_shards: u64) -> String {
    for i in 0..10_000u64 {
        let candidate = format!("{}-{}", prefix, i);
        if shard_key(&candidate, num_shards) == shard {
            return candidate;
        }
    }
    unreachable!("no key landed on shard {} of {}", shard, num_shards)
}
