//! Transaction coordinator
//!
//! Owns the logical clock, the committed-transaction history and the
//! shard map. OCC commits validate backward against the history and fan
//! the write phase out to the data nodes; S2PL commits only draw a commit
//! timestamp, since their writes were applied under locks.

pub mod clock;
pub mod grpc;
pub mod history;
pub mod http;
pub mod manager;
pub mod server;

pub use clock::LogicalClock;
pub use history::{CommitHistory, CommittedTxn, LiveSet};
pub use manager::{CommitOutcome, TxnManager};
pub use server::Coordinator;
