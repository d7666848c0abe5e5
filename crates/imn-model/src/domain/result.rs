use serde::{Deserialize, Serialize};

/// A measurement result, identified by `(agent_id, request_id)`.
///
/// Immutable once written; duplicate stores are absorbed by the idempotency
/// mark keyed on the request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Request id of the workflow that produced this result.
    pub id: String,
    pub agent_id: String,
    pub module_name: String,
    /// Opaque module payload, JSON-encoded by convention.
    #[serde(default)]
    pub data: Vec<u8>,
    /// Unix seconds when the agent produced the payload.
    pub created_at: i64,
    /// Unix seconds when the coordinator ingested it.
    pub received_at: i64,
    /// Unix seconds when the producing agent process started.
    #[serde(default)]
    pub agent_start_time: i64,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub module_revision: String,
    /// Id of the coordinator that persisted the record.
    #[serde(default)]
    pub server_id: String,
    /// Ingest path tag, e.g. "bus" or "task".
    #[serde(default)]
    pub source: String,
}

impl MeasurementResult {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        module_name: impl Into<String>,
        data: Vec<u8>,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            module_name: module_name.into(),
            data,
            created_at: now,
            received_at: now,
            agent_start_time: 0,
            agent_version: String::new(),
            module_revision: String::new(),
            server_id: String::new(),
            source: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let mut result = MeasurementResult::new("w1", "a1", "ping_module", b"{}".to_vec(), 10);
        result.server_id = "coord-1".into();
        result.source = "bus".into();

        let json = serde_json::to_string(&result).unwrap();
        let back: MeasurementResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
