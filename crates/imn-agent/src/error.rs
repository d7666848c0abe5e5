use imn_bus::BusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("module setup failed: {module}: {message}")]
    Setup { module: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Error returned by a module handler.
///
/// This is the "handler-raised" failure mode: it becomes an error payload
/// on the module's error subject and an `error` state transition. Unhandled
/// panics are a different path and map to `failed`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ModuleError {
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
