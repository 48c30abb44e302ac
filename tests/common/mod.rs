//! In-process cluster harness shared by the integration tests
//!
//! Boots real gRPC and HTTP servers on ephemeral ports, so the tests
//! exercise the same wire path as the binaries.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

use duokv::common::CoordinatorConfig;
use duokv::coordinator::grpc::CoordGrpcService;
use duokv::coordinator::http::{create_router as coord_router, CoordState};
use duokv::coordinator::TxnManager;
use duokv::node::grpc::NodeGrpcService;
use duokv::node::http::{create_router as node_router, NodeState};
use duokv::node::{LockTable, ShardStore};
use duokv::Client;

pub struct TestCluster {
    pub client: Client,
    pub coordinator_addr: String,
    pub coordinator_http: String,
    pub node_addrs: Vec<String>,
    pub node_http: Vec<String>,
    pub num_nodes: u64,
}

pub async fn spawn_cluster(num_nodes: usize) -> TestCluster {
    spawn_cluster_with(num_nodes, None).await
}

pub async fn spawn_cluster_with(
    num_nodes: usize,
    max_txn_age: Option<Duration>,
) -> TestCluster {
    let mut node_addrs = Vec::new();
    let mut node_http = Vec::new();

    for index in 0..num_nodes {
        let store = Arc::new(ShardStore::new(16));
        let locks = Arc::new(LockTable::new());

        let grpc_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let grpc_addr = grpc_listener.local_addr().unwrap();
        let service = NodeGrpcService::new(store.clone(), locks.clone(), Duration::from_secs(10));
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(service.into_server())
                .serve_with_incoming(TcpListenerStream::new(grpc_listener))
                .await
                .unwrap();
        });
        node_addrs.push(format!("http://{}", grpc_addr));

        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = http_listener.local_addr().unwrap();
        let router = node_router(NodeState {
            store,
            locks,
            node_index: index as u32,
        });
        tokio::spawn(async move {
            axum::serve(http_listener, router).await.unwrap();
        });
        node_http.push(format!("http://{}", http_addr));
    }

    let config = CoordinatorConfig {
        nodes: node_addrs.clone(),
        ..Default::default()
    };
    let manager = Arc::new(TxnManager::connect(&config).await.unwrap());
    let _gc = manager.clone().start_gc(Duration::from_millis(200), max_txn_age);

    let grpc_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let coordinator_addr = format!("http://{}", grpc_listener.local_addr().unwrap());
    let service = CoordGrpcService::new(manager.clone());
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming(TcpListenerStream::new(grpc_listener))
            .await
            .unwrap();
    });

    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let coordinator_http = format!("http://{}", http_listener.local_addr().unwrap());
    let router = coord_router(CoordState { manager });
    tokio::spawn(async move {
        axum::serve(http_listener, router).await.unwrap();
    });

    let client = Client::connect(coordinator_addr.clone(), node_addrs.clone())
        .await
        .unwrap();

    TestCluster {
        client,
        coordinator_addr,
        coordinator_http,
        node_addrs,
        node_http,
        num_nodes: num_nodes as u64,
    }
}
