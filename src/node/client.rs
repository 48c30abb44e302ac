//! RPC client handle for a data node
//!
//! Used by the coordinator's write phase and by the transaction client.
//! Lock-discipline rejections travel in-band (`error` fields) and are
//! mapped to typed errors here so callers never string-match.

use tonic::transport::Channel;

use crate::common::{AbortReason, Error, Result};
use crate::node::grpc::{ERR_DEADLOCK_ABORT, ERR_LOCK_NOT_HELD};
use crate::proto::node_api_client::NodeApiClient;
use crate::proto::*;

#[derive(Clone)]
pub struct NodeClient {
    client: NodeApiClient<Channel>,
}

impl NodeClient {
    pub async fn connect(addr: String) -> Result<Self> {
        let client = NodeApiClient::connect(addr.clone())
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{}: {}", addr, e)))?;
        Ok(Self { client })
    }

    fn map_rejection(error: &str, key: &str) -> Error {
        match error {
            ERR_DEADLOCK_ABORT => Error::aborted(AbortReason::DeadlockAbort),
            ERR_LOCK_NOT_HELD => Error::LockNotHeld(key.to_string()),
            other => Error::Internal(other.to_string()),
        }
    }

    /// Read a key. `tid` 0 selects the unlocked path; MISSING maps to `None`.
    pub async fn get(&mut self, key: &str, tid: u64) -> Result<Option<Vec<u8>>> {
        let request = tonic::Request::new(GetRequest {
            key: key.to_string(),
            tid,
        });
        let resp = self.client.get(request).await?.into_inner();
        if !resp.error.is_empty() {
            return Err(Self::map_rejection(&resp.error, key));
        }
        Ok(resp.found.then_some(resp.value))
    }

    pub async fn put(&mut self, key: &str, value: Vec<u8>, tid: u64) -> Result<()> {
        let request = tonic::Request::new(PutRequest {
            key: key.to_string(),
            value,
            tid,
        });
        let resp = self.client.put(request).await?.into_inner();
        if !resp.ok {
            return Err(Self::map_rejection(&resp.error, key));
        }
        Ok(())
    }

    pub async fn lock_acquire(
        &mut self,
        tid: u64,
        key: &str,
        mode: LockMode,
        timeout_ms: u64,
    ) -> Result<LockOutcome> {
        let request = tonic::Request::new(LockAcquireRequest {
            tid,
            key: key.to_string(),
            mode: mode as i32,
            timeout_ms,
        });
        let resp = self.client.lock_acquire(request).await?.into_inner();
        Ok(resp.outcome())
    }

    /// Fence `tid` for commit on this node. `false` means the transaction
    /// was already wounded there and must abort.
    pub async fn lock_fence(&mut self, tid: u64) -> Result<bool> {
        let request = tonic::Request::new(LockFenceRequest { tid });
        let resp = self.client.lock_fence(request).await?.into_inner();
        Ok(resp.ok)
    }

    pub async fn lock_release_all(&mut self, tid: u64) -> Result<()> {
        let request = tonic::Request::new(LockReleaseAllRequest { tid });
        self.client.lock_release_all(request).await?;
        Ok(())
    }
}
