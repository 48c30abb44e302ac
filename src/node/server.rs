//! Data node server

use std::sync::Arc;
use std::time::Duration;

use crate::common::{NodeConfig, Result};
use crate::node::grpc::NodeGrpcService;
use crate::node::http::{create_router, NodeState};
use crate::node::locks::LockTable;
use crate::node::store::ShardStore;

pub struct DataNode {
    config: NodeConfig,
}

impl DataNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting data node {}", self.config.node_index);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  gRPC API: {}", self.config.grpc_addr);
        tracing::info!("  Store buckets: {}", self.config.num_buckets);

        let store = Arc::new(ShardStore::new(self.config.num_buckets));
        let locks = Arc::new(LockTable::new());

        // Create HTTP server
        let http_state = NodeState {
            store: store.clone(),
            locks: locks.clone(),
            node_index: self.config.node_index,
        };
        let http_router = create_router(http_state);

        // Create gRPC server
        let grpc_service = NodeGrpcService::new(
            store,
            locks,
            Duration::from_millis(self.config.max_lock_wait_ms),
        );
        let grpc_server = tonic::transport::Server::builder()
            .add_service(grpc_service.into_server())
            .serve(self.config.grpc_addr);

        // Start servers
        let http_listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = axum::serve(http_listener, http_router);

        tracing::info!("✓ Data node ready");

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            res = grpc_server => {
                if let Err(e) = res {
                    tracing::error!("gRPC server error: {}", e);
                }
            }
        }

        Ok(())
    }
}
