//! Error types for duokv

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a transaction aborted.
///
/// `StaleRead`, `DeadlockAbort` and `LockTimeout` are transient: the caller
/// may retry with a fresh transaction. `ApplyFailed` means a commit
/// timestamp was assigned (the transaction is logically committed) but a
/// node failed to apply one of its writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    StaleRead,
    DeadlockAbort,
    LockTimeout,
    ClientAbort,
    ApplyFailed,
    Expired,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbortReason::StaleRead => "STALE_READ",
            AbortReason::DeadlockAbort => "DEADLOCK_ABORT",
            AbortReason::LockTimeout => "LOCK_TIMEOUT",
            AbortReason::ClientAbort => "CLIENT_ABORT",
            AbortReason::ApplyFailed => "APPLY_FAILED",
            AbortReason::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

impl From<AbortReason> for crate::proto::AbortReason {
    fn from(r: AbortReason) -> Self {
        use crate::proto::AbortReason as Wire;
        match r {
            AbortReason::StaleRead => Wire::StaleRead,
            AbortReason::DeadlockAbort => Wire::DeadlockAbort,
            AbortReason::LockTimeout => Wire::LockTimeout,
            AbortReason::ClientAbort => Wire::ClientAbort,
            AbortReason::ApplyFailed => Wire::ApplyFailed,
            AbortReason::Expired => Wire::Expired,
        }
    }
}

impl From<crate::proto::AbortReason> for AbortReason {
    fn from(r: crate::proto::AbortReason) -> Self {
        use crate::proto::AbortReason as Wire;
        match r {
            Wire::StaleRead => AbortReason::StaleRead,
            Wire::DeadlockAbort => AbortReason::DeadlockAbort,
            Wire::LockTimeout => AbortReason::LockTimeout,
            Wire::ApplyFailed => AbortReason::ApplyFailed,
            Wire::Expired => AbortReason::Expired,
            Wire::ClientAbort | Wire::Unspecified => AbortReason::ClientAbort,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // === I/O / network ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    // === Transaction errors ===
    #[error("transaction aborted: {reason}")]
    TxnAborted { reason: AbortReason },

    #[error("transaction {0} already finished")]
    TxnFinished(u64),

    // === Node errors ===
    #[error("lock not held on key {0}")]
    LockNotHeld(String),

    #[error("shard {index} out of range (cluster has {count} nodes)")]
    ShardOutOfRange { index: usize, count: usize },

    // === Config errors ===
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an aborted-transaction error.
    pub fn aborted(reason: AbortReason) -> Self {
        Error::TxnAborted { reason }
    }

    /// Is this an error the caller can retry with a fresh transaction?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TxnAborted { reason } => matches!(
                reason,
                AbortReason::StaleRead | AbortReason::DeadlockAbort | AbortReason::LockTimeout
            ),
            Error::Timeout(_) | Error::ConnectionFailed(_) => true,
            _ => false,
        }
    }

    /// Convert to gRPC status for RPC responses
    pub fn to_grpc_status(&self) -> tonic::Status {
        use tonic::Code;
        match self {
            Error::TxnAborted { .. } => tonic::Status::new(Code::Aborted, self.to_string()),
            Error::TxnFinished(_) | Error::LockNotHeld(_) => {
                tonic::Status::new(Code::FailedPrecondition, self.to_string())
            }
            Error::InvalidConfig(_) | Error::ShardOutOfRange { .. } => {
                tonic::Status::new(Code::InvalidArgument, self.to_string())
            }
            Error::Timeout(_) => tonic::Status::new(Code::DeadlineExceeded, self.to_string()),
            Error::Grpc(status) => status.clone(),
            _ => tonic::Status::new(Code::Internal, self.to_string()),
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_reasons() {
        assert!(Error::aborted(AbortReason::StaleRead).is_retryable());
        assert!(Error::aborted(AbortReason::DeadlockAbort).is_retryable());
        assert!(Error::aborted(AbortReason::LockTimeout).is_retryable());
        assert!(!Error::aborted(AbortReason::ClientAbort).is_retryable());
        assert!(!Error::aborted(AbortReason::ApplyFailed).is_retryable());
        assert!(!Error::TxnFinished(7).is_retryable());
    }

    #[test]
    fn test_wire_round_trip() {
        for reason in [
            AbortReason::StaleRead,
            AbortReason::DeadlockAbort,
            AbortReason::LockTimeout,
            AbortReason::ClientAbort,
            AbortReason::ApplyFailed,
            AbortReason::Expired,
        ] {
            let wire: crate::proto::AbortReason = reason.into();
            assert_eq!(AbortReason::from(wire), reason);
        }
    }
}
