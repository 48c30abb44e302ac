//! Coordinator server

use std::sync::Arc;
use std::time::Duration;

use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::grpc::CoordGrpcService;
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::manager::TxnManager;

pub struct Coordinator {
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting coordinator");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  gRPC API: {}", self.config.grpc_addr);
        tracing::info!("  Nodes: {:?}", self.config.nodes);

        // Connect to the data nodes; they may still be coming up.
        let manager = Arc::new(Self::connect_with_retry(&self.config).await?);

        // Start background history pruning
        let _gc_handle = manager.clone().start_gc(
            Duration::from_millis(self.config.prune_interval_ms),
            self.config.max_txn_age_ms.map(Duration::from_millis),
        );

        // Create HTTP server
        let http_state = CoordState {
            manager: manager.clone(),
        };
        let http_router = create_router(http_state);

        // Create gRPC server
        let grpc_service = CoordGrpcService::new(manager);
        let grpc_server = tonic::transport::Server::builder()
            .add_service(grpc_service.into_server())
            .serve(self.config.grpc_addr);

        // Start servers
        let http_listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = axum::serve(http_listener, http_router);

        tracing::info!("✓ Coordinator ready");

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

    async fn connect_with_retry(config: &CoordinatorConfig) -> Result<TxnManager> {
        const ATTEMPTS: usize = 10;
        let mut last_err = None;
        for attempt in 1..=ATTEMPTS {
            match TxnManager::connect(config).await {
                Ok(manager) => return Ok(manager),
                Err(e) => {
                    tracing::warn!("node connect attempt {}/{} failed: {}", attempt, ATTEMPTS, e);
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
        Err(last_err.unwrap())
    }
}
