//! Data node gRPC service (internal)
//!
//! Serves the two access paths over one surface. `tid == 0` is the
//! unlocked path used by OCC reads and the coordinator's write phase;
//! any other tid is the S2PL path and the node enforces the lock
//! discipline before touching the store.

use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};

use crate::common::metrics::metrics;
use crate::node::locks::{LockMode, LockOutcome, LockTable};
use crate::node::store::ShardStore;
use crate::proto::node_api_server::{NodeApi, NodeApiServer};
use crate::proto::*;

/// In-band rejection markers, matched by [`crate::node::NodeClient`].
pub const ERR_DEADLOCK_ABORT: &str = "DEADLOCK_ABORT";
pub const ERR_LOCK_NOT_HELD: &str = "LOCK_NOT_HELD";

pub struct NodeGrpcService {
    store: Arc<ShardStore>,
    locks: Arc<LockTable>,
    max_lock_wait: Duration,
}

impl NodeGrpcService {
    pub fn new(store: Arc<ShardStore>, locks: Arc<LockTable>, max_lock_wait: Duration) -> Self {
        Self {
            store,
            locks,
            max_lock_wait,
        }
    }

    /// Converts this service into a gRPC server instance.
    pub fn into_server(self) -> NodeApiServer<Self> {
        NodeApiServer::new(self)
    }

    /// S2PL discipline check for a locked-path operation.
    fn check_lock(&self, tid: u64, key: &str, need: LockMode) -> Option<&'static str> {
        if self.locks.is_wounded(tid) {
            return Some(ERR_DEADLOCK_ABORT);
        }
        if !self.locks.holds(tid, key, need) {
            return Some(ERR_LOCK_NOT_HELD);
        }
        None
    }
}

#[tonic::async_trait]
impl NodeApi for NodeGrpcService {
    async fn get(&self, req: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = req.into_inner();
        metrics().record_get();

        if req.tid != 0 {
            if let Some(err) = self.check_lock(req.tid, &req.key, LockMode::Shared) {
                return Ok(Response::new(GetResponse {
                    found: false,
                    value: Vec::new(),
                    error: err.to_string(),
                }));
            }
        }

        let resp = match self.store.get(&req.key) {
            Some(value) => GetResponse {
                found: true,
                value,
                error: String::new(),
            },
            None => GetResponse {
                found: false,
                value: Vec::new(),
                error: String::new(),
            },
        };
        Ok(Response::new(resp))
    }

    async fn put(&self, req: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = req.into_inner();
        metrics().record_put();

        if req.tid != 0 {
            if let Some(err) = self.check_lock(req.tid, &req.key, LockMode::Exclusive) {
                return Ok(Response::new(PutResponse {
                    ok: false,
                    error: err.to_string(),
                }));
            }
        }

        self.store.put(&req.key, req.value);
        Ok(Response::new(PutResponse {
            ok: true,
            error: String::new(),
        }))
    }

    async fn lock_acquire(
        &self,
        req: Request<LockAcquireRequest>,
    ) -> Result<Response<LockAcquireResponse>, Status> {
        let req = req.into_inner();
        if req.tid == 0 {
            return Err(Status::invalid_argument("tid 0 is reserved"));
        }

        let mode = match req.mode() {
            crate::proto::LockMode::Shared => LockMode::Shared,
            crate::proto::LockMode::Exclusive => LockMode::Exclusive,
        };
        let wait = Duration::from_millis(req.timeout_ms).min(self.max_lock_wait);

        let outcome = self.locks.acquire(req.tid, &req.key, mode, wait).await;
        tracing::debug!(tid = req.tid, key = %req.key, ?mode, ?outcome, "lock acquire");

        let wire = match outcome {
            LockOutcome::Granted => crate::proto::LockOutcome::Granted,
            LockOutcome::Timeout => crate::proto::LockOutcome::Timeout,
            LockOutcome::DeadlockAbort => crate::proto::LockOutcome::DeadlockAbort,
        };
        Ok(Response::new(LockAcquireResponse {
            outcome: wire as i32,
        }))
    }

    async fn lock_fence(
        &self,
        req: Request<LockFenceRequest>,
    ) -> Result<Response<LockFenceResponse>, Status> {
        let req = req.into_inner();
        if req.tid == 0 {
            return Err(Status::invalid_argument("tid 0 is reserved"));
        }
        let ok = self.locks.begin_commit(req.tid);
        tracing::debug!(tid = req.tid, ok, "commit fence");
        Ok(Response::new(LockFenceResponse { ok }))
    }

    async fn lock_release_all(
        &self,
        req: Request<LockReleaseAllRequest>,
    ) -> Result<Response<LockReleaseAllResponse>, Status> {
        let req = req.into_inner();
        self.locks.release_all(req.tid);
        tracing::debug!(tid = req.tid, "released all locks");
        Ok(Response::new(LockReleaseAllResponse { ok: true }))
    }
}
