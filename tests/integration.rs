//! Integration tests for duokv
//!
//! Each test boots its own in-process cluster (real gRPC + HTTP on
//! ephemeral ports) and drives it through the client library.

mod common;

use std::time::Duration;

use duokv::common::hash::key_on_shard;
use duokv::common::{AbortReason, Error};
use duokv::node::NodeClient;
use duokv::Mode;

use common::spawn_cluster;

#[tokio::test]
async fn test_write_commit_read_back() {
    let cluster = spawn_cluster(2).await;

    let mut writer = cluster.client.begin(Mode::Occ).await.unwrap();
    writer.write("greeting", b"hello".to_vec()).await.unwrap();
    let ts = writer.commit().await.unwrap();
    assert!(ts > writer.tid());

    let mut reader = cluster.client.begin(Mode::Occ).await.unwrap();
    assert_eq!(reader.read("greeting").await.unwrap().unwrap(), b"hello");
    reader.commit().await.unwrap();
}

#[tokio::test]
async fn test_missing_key_reads_none() {
    let cluster = spawn_cluster(2).await;

    let mut txn = cluster.client.begin(Mode::Occ).await.unwrap();
    assert_eq!(txn.read("never-written").await.unwrap(), None);
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn test_read_your_own_writes() {
    let cluster = spawn_cluster(2).await;

    for mode in [Mode::Occ, Mode::S2pl] {
        let mut txn = cluster.client.begin(mode).await.unwrap();
        txn.write("ryow", b"buffered".to_vec()).await.unwrap();
        // The write is only buffered, yet the transaction sees it.
        assert_eq!(txn.read("ryow").await.unwrap().unwrap(), b"buffered");
        txn.abort().await.unwrap();
    }
}

#[tokio::test]
async fn test_repeated_reads_stable() {
    let cluster = spawn_cluster(2).await;

    let mut seed = cluster.client.begin(Mode::Occ).await.unwrap();
    seed.write("stable", b"v1".to_vec()).await.unwrap();
    seed.commit().await.unwrap();

    let mut reader = cluster.client.begin(Mode::Occ).await.unwrap();
    assert_eq!(reader.read("stable").await.unwrap().unwrap(), b"v1");

    let mut writer = cluster.client.begin(Mode::Occ).await.unwrap();
    writer.write("stable", b"v2".to_vec()).await.unwrap();
    writer.commit().await.unwrap();

    // Still v1 inside the first transaction, however often we ask.
    assert_eq!(reader.read("stable").await.unwrap().unwrap(), b"v1");
    assert_eq!(reader.read("stable").await.unwrap().unwrap(), b"v1");
    reader.abort().await.unwrap();
}

#[tokio::test]
async fn test_abort_discards_writes() {
    let cluster = spawn_cluster(2).await;

    for mode in [Mode::Occ, Mode::S2pl] {
        let key = format!("discarded-{:?}", mode);
        let mut txn = cluster.client.begin(mode).await.unwrap();
        txn.write(&key, b"ghost".to_vec()).await.unwrap();
        txn.abort().await.unwrap();

        let mut reader = cluster.client.begin(Mode::Occ).await.unwrap();
        assert_eq!(reader.read(&key).await.unwrap(), None);
        reader.commit().await.unwrap();
    }
}

#[tokio::test]
async fn test_finished_handle_fails_fast() {
    let cluster = spawn_cluster(2).await;

    let mut txn = cluster.client.begin(Mode::Occ).await.unwrap();
    txn.abort().await.unwrap();

    assert!(matches!(
        txn.read("any").await,
        Err(Error::TxnFinished(_))
    ));
    assert!(matches!(
        txn.write("any", b"v".to_vec()).await,
        Err(Error::TxnFinished(_))
    ));
    assert!(matches!(txn.commit().await, Err(Error::TxnFinished(_))));
    assert!(matches!(txn.abort().await, Err(Error::TxnFinished(_))));
}

#[tokio::test]
async fn test_s2pl_lifecycle() {
    let cluster = spawn_cluster(2).await;

    let mut txn = cluster.client.begin(Mode::S2pl).await.unwrap();
    assert_eq!(txn.read("balance").await.unwrap(), None);
    txn.write("balance", b"100".to_vec()).await.unwrap();
    txn.commit().await.unwrap();

    let mut reader = cluster.client.begin(Mode::S2pl).await.unwrap();
    assert_eq!(reader.read("balance").await.unwrap().unwrap(), b"100");
    reader.commit().await.unwrap();
}

#[tokio::test]
async fn test_commit_timestamps_totally_ordered() {
    let cluster = spawn_cluster(2).await;

    let mut prev = 0;
    for (i, mode) in [Mode::Occ, Mode::S2pl, Mode::Occ, Mode::S2pl]
        .into_iter()
        .enumerate()
    {
        let mut txn = cluster.client.begin(mode).await.unwrap();
        assert!(txn.tid() > prev);
        txn.write(&format!("ordered-{}", i), vec![i as u8])
            .await
            .unwrap();
        let ts = txn.commit().await.unwrap();
        assert!(ts > txn.tid());
        assert!(ts > prev);
        prev = ts;
    }
}

#[tokio::test]
async fn test_multi_shard_write_fanout() {
    let cluster = spawn_cluster(2).await;
    let k0 = key_on_shard("fanout", 0, cluster.num_nodes);
    let k1 = key_on_shard("fanout", 1, cluster.num_nodes);

    let mut txn = cluster.client.begin(Mode::Occ).await.unwrap();
    txn.write(&k0, b"zero".to_vec()).await.unwrap();
    txn.write(&k1, b"one".to_vec()).await.unwrap();
    txn.commit().await.unwrap();

    // Each node holds exactly its own shard's key.
    let mut node0 = NodeClient::connect(cluster.node_addrs[0].clone())
        .await
        .unwrap();
    let mut node1 = NodeClient::connect(cluster.node_addrs[1].clone())
        .await
        .unwrap();
    assert_eq!(node0.get(&k0, 0).await.unwrap().unwrap(), b"zero");
    assert_eq!(node0.get(&k1, 0).await.unwrap(), None);
    assert_eq!(node1.get(&k1, 0).await.unwrap().unwrap(), b"one");
    assert_eq!(node1.get(&k0, 0).await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_transaction_aborts() {
    let cluster =
        common::spawn_cluster_with(2, Some(Duration::from_millis(100))).await;

    let mut txn = cluster.client.begin(Mode::Occ).await.unwrap();
    txn.write("slow", b"v".to_vec()).await.unwrap();
    // Outlive the age bound; the pruning task expires us.
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(matches!(
        txn.commit().await,
        Err(Error::TxnAborted {
            reason: AbortReason::Expired
        })
    ));
}

#[tokio::test]
async fn test_status_endpoints() {
    let cluster = spawn_cluster(2).await;

    // Put some traffic through so the counters move.
    let mut txn = cluster.client.begin(Mode::Occ).await.unwrap();
    txn.write("status-key", b"v".to_vec()).await.unwrap();
    txn.commit().await.unwrap();

    let http = reqwest::Client::new();

    let health = http
        .get(format!("{}/health", cluster.coordinator_http))
        .send()
        .await
        .unwrap();
    assert!(health.status().is_success());

    let coord: serde_json::Value = http
        .get(format!("{}/status", cluster.coordinator_http))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(coord["role"], "coordinator");
    assert_eq!(coord["nodes"], 2);
    assert!(coord["last_ts"].as_u64().unwrap() >= 2);
    assert!(coord["metrics"]["txn_committed"].as_u64().unwrap() >= 1);

    let node: serde_json::Value = http
        .get(format!("{}/status", cluster.node_http[0]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(node["role"], "node");
    assert_eq!(node["node_index"], 0);
    assert!(node["locks"]["locked_keys"].as_u64().is_some());
}
