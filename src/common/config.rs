//! Configuration for duokv components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Role (coordinator or node)
    pub role: Role,

    /// Coordinator-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,

    /// Node-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeConfig>,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Coordinator,
    Node,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the HTTP status API
    pub bind_addr: SocketAddr,

    /// Bind address for internal gRPC
    pub grpc_addr: SocketAddr,

    /// Data node gRPC endpoints, in shard order
    pub nodes: Vec<String>,

    /// Interval between history-pruning passes
    #[serde(default = "default_prune_interval")]
    pub prune_interval_ms: u64,

    /// Abort live transactions older than this, to keep history prunable.
    /// Off by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_txn_age_ms: Option<u64>,

    /// Write-phase retries per node before reporting APPLY_FAILED
    #[serde(default = "default_write_retries")]
    pub write_retries: usize,

    /// Delay between write-phase retries
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_prune_interval() -> u64 {
    1_000
}
fn default_write_retries() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    50
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".parse().unwrap(),
            grpc_addr: "0.0.0.0:5001".parse().unwrap(),
            nodes: vec![],
            prune_interval_ms: default_prune_interval(),
            max_txn_age_ms: None,
            write_retries: default_write_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

/// Data node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bind address for the HTTP status API
    pub bind_addr: SocketAddr,

    /// Bind address for internal gRPC
    pub grpc_addr: SocketAddr,

    /// Which shard of the key space this node owns
    pub node_index: u32,

    /// Store buckets (disjoint keys in different buckets never serialize)
    #[serde(default = "default_buckets")]
    pub num_buckets: usize,

    /// Upper bound a client may ask a lock acquisition to wait
    #[serde(default = "default_max_lock_wait")]
    pub max_lock_wait_ms: u64,
}

fn default_buckets() -> usize {
    64
}
fn default_max_lock_wait() -> u64 {
    10_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7000".parse().unwrap(),
            grpc_addr: "0.0.0.0:7001".parse().unwrap(),
            node_index: 0,
            num_buckets: default_buckets(),
            max_lock_wait_ms: default_max_lock_wait(),
        }
    }
}

/// Client-side runtime knobs
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long a lock acquisition waits before LOCK_TIMEOUT
    pub lock_timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Per-RPC timeout
    pub request_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save to file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::Internal(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        match self.role {
            Role::Coordinator => {
                let Some(coord) = &self.coordinator else {
                    return Err(crate::Error::InvalidConfig(
                        "coordinator config required".into(),
                    ));
                };
                if coord.nodes.is_empty() {
                    return Err(crate::Error::InvalidConfig(
                        "coordinator needs at least one node endpoint".into(),
                    ));
                }
            }
            Role::Node => {
                if self.node.is_none() {
                    return Err(crate::Error::InvalidConfig("node config required".into()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_nodes() {
        let config = Config {
            role: Role::Coordinator,
            coordinator: Some(CoordinatorConfig::default()),
            node: None,
            log_level: "info".into(),
        };
        assert!(config.validate().is_err());

        let config = Config {
            role: Role::Coordinator,
            coordinator: Some(CoordinatorConfig {
                nodes: vec!["http://localhost:7001".into()],
                ..Default::default()
            }),
            node: None,
            log_level: "info".into(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config {
            role: Role::Node,
            coordinator: None,
            node: Some(NodeConfig::default()),
            log_level: "debug".into(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, Role::Node);
        assert_eq!(parsed.node.unwrap().num_buckets, 64);
    }
}
