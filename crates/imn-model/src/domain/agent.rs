use serde::{Deserialize, Serialize};

use crate::ConfigMap;

/// A registered measurement agent.
///
/// Created on first heartbeat and never destroyed; an agent that stops
/// heartbeating is reported dead but its record is retained. The `alive`
/// flag is recomputed on read from `last_seen`, it is not authoritative in
/// storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub hostname: String,
    pub alive: bool,
    /// Unix seconds of the first heartbeat ever observed.
    pub first_seen: i64,
    /// Unix seconds of the most recent heartbeat. Monotonically advanced.
    pub last_seen: i64,
    #[serde(default)]
    pub config: ConfigMap,
    /// Monotonic heartbeat counter reported by the agent itself.
    pub total_heartbeats: i64,
}

impl Agent {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            alive: true,
            first_seen: now,
            last_seen: now,
            config: ConfigMap::new(),
            total_heartbeats: 0,
        }
    }

    /// Liveness at `now`: the last heartbeat is within `window_secs`.
    pub fn is_alive(&self, now: i64, window_secs: i64) -> bool {
        now - self.last_seen <= window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_within_window() {
        let agent = Agent::new("a1", "host-a", 1_000);
        assert!(agent.is_alive(1_010, 10));
        assert!(!agent.is_alive(1_011, 10));
    }

    #[test]
    fn serde_roundtrip() {
        let mut agent = Agent::new("a1", "host-a", 42);
        agent.config.insert("region".into(), "eu".into());
        agent.total_heartbeats = 7;

        let json = serde_json::to_string(&agent).unwrap();
        let back: Agent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, agent);
    }
}
