//! Coordinator gRPC service (internal)
//!
//! Thin wire adapter over [`TxnManager`]: every handler decodes, delegates
//! and encodes. Abort outcomes travel in-band so clients get a typed
//! reason rather than a status string.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::coordinator::manager::{CommitOutcome, TxnManager};
use crate::proto::coordinator_api_server::{CoordinatorApi, CoordinatorApiServer};
use crate::proto::*;

pub struct CoordGrpcService {
    manager: Arc<TxnManager>,
}

impl CoordGrpcService {
    pub fn new(manager: Arc<TxnManager>) -> Self {
        Self { manager }
    }

    /// Converts this service into a gRPC server instance.
    pub fn into_server(self) -> CoordinatorApiServer<Self> {
        CoordinatorApiServer::new(self)
    }
}

#[tonic::async_trait]
impl CoordinatorApi for CoordGrpcService {
    async fn begin(&self, _req: Request<BeginRequest>) -> Result<Response<BeginResponse>, Status> {
        let tid = self.manager.begin();
        Ok(Response::new(BeginResponse { tid }))
    }

    async fn validate_commit(
        &self,
        req: Request<ValidateCommitRequest>,
    ) -> Result<Response<ValidateCommitResponse>, Status> {
        let req = req.into_inner();
        let read_set: HashSet<String> = req.read_keys.into_iter().collect();
        let writes: HashMap<String, Vec<u8>> = req
            .writes
            .into_iter()
            .map(|kv| (kv.key, kv.value))
            .collect();

        let resp = match self
            .manager
            .validate_and_commit(req.tid, read_set, writes)
            .await
        {
            CommitOutcome::Committed(ts_commit) => ValidateCommitResponse {
                committed: true,
                commit_ts: ts_commit,
                reason: AbortReason::Unspecified as i32,
            },
            CommitOutcome::Aborted(reason) => ValidateCommitResponse {
                committed: false,
                commit_ts: 0,
                reason: AbortReason::from(reason) as i32,
            },
        };
        Ok(Response::new(resp))
    }

    async fn commit(
        &self,
        req: Request<CommitRequest>,
    ) -> Result<Response<CommitResponse>, Status> {
        let req = req.into_inner();
        let written_keys: HashSet<String> = req.written_keys.into_iter().collect();

        let resp = match self.manager.commit_locked(req.tid, written_keys).await {
            CommitOutcome::Committed(ts_commit) => CommitResponse {
                ok: true,
                commit_ts: ts_commit,
                reason: AbortReason::Unspecified as i32,
            },
            CommitOutcome::Aborted(reason) => CommitResponse {
                ok: false,
                commit_ts: 0,
                reason: AbortReason::from(reason) as i32,
            },
        };
        Ok(Response::new(resp))
    }

    async fn abort(&self, req: Request<AbortRequest>) -> Result<Response<AbortResponse>, Status> {
        let req = req.into_inner();
        self.manager.abort(req.tid);
        Ok(Response::new(AbortResponse { ok: true }))
    }
}
