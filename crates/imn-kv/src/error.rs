use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("conflicting write on key: {0}")]
    VersionConflict(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("corrupt journal: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for KvError {
    fn from(e: std::io::Error) -> Self {
        KvError::Io(e.to_string())
    }
}

impl KvError {
    /// Transient errors that a caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, KvError::Transport(_))
    }
}
