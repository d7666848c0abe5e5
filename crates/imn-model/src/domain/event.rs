use serde::{Deserialize, Serialize};

use crate::ConfigMap;

/// Kind tag of an event-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Timeout,
    WorkflowCompleted,
    WorkflowFailed,
    HandlerError,
    HandlerCrash,
    DeadLetter,
    Recovery,
    AgentRegistered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Timeout => "timeout",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::WorkflowFailed => "workflow_failed",
            EventKind::HandlerError => "handler_error",
            EventKind::HandlerCrash => "handler_crash",
            EventKind::DeadLetter => "dead_letter",
            EventKind::Recovery => "recovery",
            EventKind::AgentRegistered => "agent_registered",
        }
    }

    pub fn parse(s: &str) -> Option<EventKind> {
        match s {
            "timeout" => Some(EventKind::Timeout),
            "workflow_completed" => Some(EventKind::WorkflowCompleted),
            "workflow_failed" => Some(EventKind::WorkflowFailed),
            "handler_error" => Some(EventKind::HandlerError),
            "handler_crash" => Some(EventKind::HandlerCrash),
            "dead_letter" => Some(EventKind::DeadLetter),
            "recovery" => Some(EventKind::Recovery),
            "agent_registered" => Some(EventKind::AgentRegistered),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record, iterated newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub kind: EventKind,
    pub message: String,
    #[serde(default)]
    pub metadata: ConfigMap,
    pub timestamp: i64,
}

impl EventLogEntry {
    pub fn new(kind: EventKind, message: impl Into<String>, now: i64) -> Self {
        Self {
            kind,
            message: message.into(),
            metadata: ConfigMap::new(),
            timestamp: now,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventKind::Timeout).unwrap(),
            r#""timeout""#
        );
        assert_eq!(
            serde_json::to_string(&EventKind::DeadLetter).unwrap(),
            r#""dead_letter""#
        );
    }

    #[test]
    fn serde_roundtrip() {
        let entry = EventLogEntry::new(EventKind::WorkflowFailed, "timed out", 5)
            .with_meta("request_id", "w1");
        let json = serde_json::to_string(&entry).unwrap();
        let back: EventLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
