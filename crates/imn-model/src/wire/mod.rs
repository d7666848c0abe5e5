//! Bus wire payloads.
//!
//! Every record here is self-describing JSON; encode-then-decode is the
//! identity for all of them.

use serde::{Deserialize, Serialize};

use crate::{ConfigMap, ModuleStatus};

/// Heartbeat broadcast on `agent.heartbeat_module`.
///
/// `first_seen` and `timestamp` are float seconds on the wire; everything
/// persisted from them is truncated to whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub agent_id: String,
    pub hostname: String,
    pub first_seen: f64,
    pub total_heartbeats: i64,
    #[serde(default)]
    pub config: ConfigMap,
    pub timestamp: f64,
}

/// Module-state transition broadcast on `agent.module.state`.
///
/// The agent does not know the stored version, so it sends 0 and the store
/// assigns the real one on persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBroadcast {
    pub agent_id: String,
    pub module_name: String,
    pub state: ModuleStatus,
    pub request_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub version: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(default)]
    pub details: ConfigMap,
}

/// Error payload published on a module's error subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Originating request id; empty when the input carried none.
    #[serde(default)]
    pub id: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_roundtrip() {
        let mut hb = Heartbeat {
            agent_id: "a1".into(),
            hostname: "host-a".into(),
            first_seen: 100.5,
            total_heartbeats: 3,
            config: ConfigMap::new(),
            timestamp: 106.5,
        };
        hb.config.insert("agent_version".into(), "0.3.0".into());

        let json = serde_json::to_vec(&hb).unwrap();
        let back: Heartbeat = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, hb);
    }

    #[test]
    fn state_broadcast_roundtrip() {
        let broadcast = StateBroadcast {
            agent_id: "a1".into(),
            module_name: "echo_module".into(),
            state: ModuleStatus::Running,
            request_id: "w1".into(),
            timestamp: 100,
            version: 0,
            error_message: String::new(),
            details: ConfigMap::new(),
        };
        let json = serde_json::to_string(&broadcast).unwrap();
        assert!(!json.contains("error_message"));
        let back: StateBroadcast = serde_json::from_str(&json).unwrap();
        assert_eq!(back, broadcast);
    }

    #[test]
    fn error_reply_roundtrip() {
        let reply = ErrorReply {
            id: "w1".into(),
            error: "boom".into(),
            details: None,
        };
        let json = serde_json::to_string(&reply).unwrap();
        let back: ErrorReply = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reply);
    }
}
