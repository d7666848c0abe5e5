use serde::{Deserialize, Serialize};

/// Queue status of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the pending set, scored by scheduled-at.
    Pending,
    /// Claimed by a worker, hidden until the visibility deadline.
    #[serde(rename = "in-flight")]
    InFlight,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InFlight => "in-flight",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in-flight" => Some(TaskStatus::InFlight),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled measurement, executed by the coordinator's task pump.
///
/// Lives in exactly one of the two sorted sets (`pending` scored by
/// `scheduled_at`, `in-flight` scored by `visible_at`) or in neither once
/// terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub agent_id: String,
    pub module_name: String,
    /// JSON-encoded measurement request payload.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Unix seconds the task becomes due.
    pub scheduled_at: i64,
    pub created_at: i64,
    pub status: TaskStatus,
    /// Visibility deadline while in-flight, 0 otherwise.
    #[serde(default)]
    pub visible_at: i64,
    #[serde(default)]
    pub retry_count: i32,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        module_name: impl Into<String>,
        payload: Vec<u8>,
        scheduled_at: i64,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            module_name: module_name.into(),
            payload,
            scheduled_at,
            created_at: now,
            status: TaskStatus::Pending,
            visible_at: 0,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InFlight).unwrap(),
            r#""in-flight""#
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Pending).unwrap(),
            r#""pending""#
        );
    }

    #[test]
    fn serde_roundtrip() {
        let task = Task::new("t1", "a1", "ping_module", b"{}".to_vec(), 100, 90);
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
