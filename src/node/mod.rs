//! Data node: one shard of the key space
//!
//! Two coexisting access paths over the same store. The OCC path is
//! lockless and atomic per key; the S2PL path runs every read and write
//! through the wound-wait lock table. The node keeps no per-transaction
//! state beyond active locks.

pub mod client;
pub mod grpc;
pub mod http;
pub mod locks;
pub mod server;
pub mod store;

pub use client::NodeClient;
pub use locks::{LockMode, LockOutcome, LockTable};
pub use server::DataNode;
pub use store::ShardStore;
