//! Transaction client library
//!
//! The only supported way into the cluster: connect once, then drive any
//! number of transactions, each under the discipline chosen at begin time.
//! Aborted transactions are never retried here; retry belongs to the
//! caller, which is what makes abort rates comparable across disciplines.

pub mod transaction;

pub use transaction::{Mode, Transaction, TxnState};

use tonic::transport::Channel;

use crate::common::{Error, Result, RuntimeConfig};
use crate::node::NodeClient;
use crate::proto::coordinator_api_client::CoordinatorApiClient;
use crate::proto::BeginRequest;

/// Shared cluster handle; cheap to clone per task.
#[derive(Clone)]
pub struct Client {
    coordinator: CoordinatorApiClient<Channel>,
    nodes: Vec<NodeClient>,
    runtime: RuntimeConfig,
}

impl Client {
    /// Connect to the coordinator and every data node (in shard order).
    pub async fn connect(coordinator_addr: String, node_addrs: Vec<String>) -> Result<Self> {
        Self::connect_with(coordinator_addr, node_addrs, RuntimeConfig::default()).await
    }

    pub async fn connect_with(
        coordinator_addr: String,
        node_addrs: Vec<String>,
        runtime: RuntimeConfig,
    ) -> Result<Self> {
        if node_addrs.is_empty() {
            return Err(Error::InvalidConfig("at least one node endpoint".into()));
        }
        let coordinator = CoordinatorApiClient::connect(coordinator_addr.clone())
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{}: {}", coordinator_addr, e)))?;
        let mut nodes = Vec::with_capacity(node_addrs.len());
        for addr in node_addrs {
            nodes.push(NodeClient::connect(addr).await?);
        }
        Ok(Self {
            coordinator,
            nodes,
            runtime,
        })
    }

    /// Begin a transaction under the given discipline.
    pub async fn begin(&self, mode: Mode) -> Result<Transaction> {
        let mut coordinator = self.coordinator.clone();
        let resp = coordinator
            .begin(tonic::Request::new(BeginRequest {}))
            .await?
            .into_inner();
        tracing::debug!(tid = resp.tid, ?mode, "transaction begun");
        Ok(Transaction::new(
            mode,
            resp.tid,
            coordinator,
            self.nodes.clone(),
            self.runtime.lock_timeout.as_millis() as u64,
        ))
    }

    /// Number of data nodes (shards) in the cluster.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}
