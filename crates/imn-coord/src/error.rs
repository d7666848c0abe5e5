use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use imn_bus::BusError;
use imn_dbos::DbosError;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("too many outstanding requests for agent {0}")]
    Busy(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("request timed out after {0}ms")]
    Timeout(u128),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("state store error: {0}")]
    Dbos(DbosError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DbosError> for CoordError {
    fn from(e: DbosError) -> Self {
        match e {
            DbosError::NotFound(what) => CoordError::NotFound(what),
            DbosError::InvalidTransition(msg) => CoordError::Conflict(msg),
            DbosError::VersionConflict(msg) => CoordError::Conflict(msg),
            other => CoordError::Dbos(other),
        }
    }
}

impl CoordError {
    fn status(&self) -> StatusCode {
        match self {
            CoordError::Validation(_) => StatusCode::BAD_REQUEST,
            CoordError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordError::AgentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoordError::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
            CoordError::Conflict(_) => StatusCode::CONFLICT,
            CoordError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoordError::Bus(_) => StatusCode::BAD_GATEWAY,
            CoordError::Dbos(_) | CoordError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoordError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
