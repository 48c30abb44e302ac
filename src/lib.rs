//! # duokv
//!
//! A distributed transactional key-value store built to run the same
//! workloads under two interchangeable concurrency-control disciplines:
//! - Optimistic Concurrency Control (OCC) with backward validation
//! - Strict Two-Phase Locking (S2PL) with wound-wait deadlock prevention
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Coordinator                 │
//! │  - logical clock (TIDs / commit ts)      │
//! │  - committed-transaction history         │
//! │  - backward validation + write phase     │
//! └───────────┬──────────────────────────────┘
//!             │ gRPC
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌──▼───────────┐
//! │ Node 0     │   │ Node 1     │   │ Node 2       │
//! │ (shard 0)  │   │ (shard 1)  │   │ (shard 2)    │
//! │ + locks    │   │ + locks    │   │ + locks      │
//! └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! Keys are placed on nodes by a deterministic hash of the key modulo the
//! node count. Nodes are in-memory and keep no per-transaction state beyond
//! active locks; restart discards everything.
//!
//! ## Usage
//!
//! ### Start the data nodes
//! ```bash
//! duokv-node serve --index 0 --bind 0.0.0.0:7000 --grpc 0.0.0.0:7001
//! duokv-node serve --index 1 --bind 0.0.0.0:7010 --grpc 0.0.0.0:7011
//! ```
//!
//! ### Start the coordinator
//! ```bash
//! duokv-coord serve \
//!   --bind 0.0.0.0:5000 \
//!   --grpc 0.0.0.0:5001 \
//!   --nodes http://localhost:7001,http://localhost:7011
//! ```
//!
//! ### Use the CLI
//! ```bash
//! duokv put my-key my-value
//! duokv get my-key
//! duokv get my-key --mode s2pl
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod node;

// Re-export commonly used types
pub use client::{Client, Mode, Transaction};
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use node::DataNode;

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("duokv");
}

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
