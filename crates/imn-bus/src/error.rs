use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus is closed")]
    Closed,

    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("transport error: {0}")]
    Transport(String),
}
