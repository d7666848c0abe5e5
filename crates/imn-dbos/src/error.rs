use imn_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbosError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DbosError {
    /// Errors worth retrying with backoff. Everything else is semantic and
    /// must surface unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbosError::Transport(_))
    }
}

impl From<StoreError> for DbosError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => DbosError::NotFound(what),
            StoreError::InvalidTransition { .. } => DbosError::InvalidTransition(e.to_string()),
            StoreError::VersionConflict { request_id } => DbosError::VersionConflict(request_id),
            StoreError::Codec(msg) => DbosError::Internal(msg),
            StoreError::Kv(kv) if kv.is_transient() => DbosError::Transport(kv.to_string()),
            StoreError::Kv(kv) => DbosError::Internal(kv.to_string()),
        }
    }
}

impl From<DbosError> for tonic::Status {
    fn from(e: DbosError) -> Self {
        match e {
            DbosError::NotFound(msg) => tonic::Status::not_found(msg),
            DbosError::InvalidTransition(msg) => tonic::Status::failed_precondition(msg),
            DbosError::VersionConflict(msg) => tonic::Status::aborted(msg),
            DbosError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            DbosError::Transport(msg) => tonic::Status::unavailable(msg),
            DbosError::Internal(msg) => tonic::Status::internal(msg),
        }
    }
}

impl From<tonic::Status> for DbosError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        let msg = status.message().to_string();
        match status.code() {
            Code::NotFound => DbosError::NotFound(msg),
            Code::FailedPrecondition => DbosError::InvalidTransition(msg),
            Code::Aborted => DbosError::VersionConflict(msg),
            Code::InvalidArgument => DbosError::InvalidArgument(msg),
            Code::Unavailable | Code::DeadlineExceeded => DbosError::Transport(msg),
            _ => DbosError::Internal(msg),
        }
    }
}
