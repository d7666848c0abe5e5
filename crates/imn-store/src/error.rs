use imn_kv::KvError;
use imn_model::ModuleStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ModuleStatus,
        to: ModuleStatus,
    },

    #[error("version conflict on request {request_id}")]
    VersionConflict { request_id: String },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("kv error: {0}")]
    Kv(KvError),
}

impl From<KvError> for StoreError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::NotFound(key) => StoreError::NotFound(key),
            other => StoreError::Kv(other),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}
