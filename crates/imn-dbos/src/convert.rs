//! Conversions between domain records and their proto counterparts.
//!
//! Domain-to-proto is infallible; the reverse parses the state/status/kind
//! strings and fails with an invalid-argument error on anything unknown.

use imn_model::{Agent, EventKind, EventLogEntry, MeasurementResult, ModuleState, ModuleStatus, Task, TaskStatus};

use crate::DbosError;
use crate::proto;

impl From<Agent> for proto::Agent {
    fn from(agent: Agent) -> Self {
        proto::Agent {
            id: agent.id,
            hostname: agent.hostname,
            alive: agent.alive,
            first_seen: agent.first_seen,
            last_seen: agent.last_seen,
            config: agent.config.into_iter().collect(),
            total_heartbeats: agent.total_heartbeats,
        }
    }
}

impl From<proto::Agent> for Agent {
    fn from(agent: proto::Agent) -> Self {
        Agent {
            id: agent.id,
            hostname: agent.hostname,
            alive: agent.alive,
            first_seen: agent.first_seen,
            last_seen: agent.last_seen,
            config: agent.config.into_iter().collect(),
            total_heartbeats: agent.total_heartbeats,
        }
    }
}

impl From<ModuleState> for proto::ModuleState {
    fn from(state: ModuleState) -> Self {
        proto::ModuleState {
            request_id: state.request_id,
            agent_id: state.agent_id,
            module_name: state.module_name,
            state: state.state.as_str().to_string(),
            error_message: state.error_message,
            details: state.details.into_iter().collect(),
            timestamp: state.timestamp,
            version: state.version,
        }
    }
}

impl TryFrom<proto::ModuleState> for ModuleState {
    type Error = DbosError;

    fn try_from(state: proto::ModuleState) -> Result<Self, Self::Error> {
        let status = ModuleStatus::parse(&state.state)
            .ok_or_else(|| DbosError::InvalidArgument(format!("unknown state '{}'", state.state)))?;
        Ok(ModuleState {
            request_id: state.request_id,
            agent_id: state.agent_id,
            module_name: state.module_name,
            state: status,
            error_message: state.error_message,
            details: state.details.into_iter().collect(),
            timestamp: state.timestamp,
            version: state.version,
        })
    }
}

impl From<MeasurementResult> for proto::MeasurementResult {
    fn from(result: MeasurementResult) -> Self {
        proto::MeasurementResult {
            id: result.id,
            agent_id: result.agent_id,
            module_name: result.module_name,
            data: result.data,
            created_at: result.created_at,
            received_at: result.received_at,
            agent_start_time: result.agent_start_time,
            agent_version: result.agent_version,
            module_revision: result.module_revision,
            server_id: result.server_id,
            source: result.source,
        }
    }
}

impl From<proto::MeasurementResult> for MeasurementResult {
    fn from(result: proto::MeasurementResult) -> Self {
        MeasurementResult {
            id: result.id,
            agent_id: result.agent_id,
            module_name: result.module_name,
            data: result.data,
            created_at: result.created_at,
            received_at: result.received_at,
            agent_start_time: result.agent_start_time,
            agent_version: result.agent_version,
            module_revision: result.module_revision,
            server_id: result.server_id,
            source: result.source,
        }
    }
}

impl From<Task> for proto::Task {
    fn from(task: Task) -> Self {
        proto::Task {
            id: task.id,
            agent_id: task.agent_id,
            module_name: task.module_name,
            payload: task.payload,
            scheduled_at: task.scheduled_at,
            created_at: task.created_at,
            status: task.status.as_str().to_string(),
            visible_at: task.visible_at,
            retry_count: task.retry_count,
        }
    }
}

impl TryFrom<proto::Task> for Task {
    type Error = DbosError;

    fn try_from(task: proto::Task) -> Result<Self, Self::Error> {
        let status = TaskStatus::parse(&task.status)
            .ok_or_else(|| DbosError::InvalidArgument(format!("unknown status '{}'", task.status)))?;
        Ok(Task {
            id: task.id,
            agent_id: task.agent_id,
            module_name: task.module_name,
            payload: task.payload,
            scheduled_at: task.scheduled_at,
            created_at: task.created_at,
            status,
            visible_at: task.visible_at,
            retry_count: task.retry_count,
        })
    }
}

impl From<EventLogEntry> for proto::EventLogEntry {
    fn from(entry: EventLogEntry) -> Self {
        proto::EventLogEntry {
            kind: entry.kind.as_str().to_string(),
            message: entry.message,
            metadata: entry.metadata.into_iter().collect(),
            timestamp: entry.timestamp,
        }
    }
}

impl TryFrom<proto::EventLogEntry> for EventLogEntry {
    type Error = DbosError;

    fn try_from(entry: proto::EventLogEntry) -> Result<Self, Self::Error> {
        let kind = EventKind::parse(&entry.kind)
            .ok_or_else(|| DbosError::InvalidArgument(format!("unknown event kind '{}'", entry.kind)))?;
        Ok(EventLogEntry {
            kind,
            message: entry.message,
            metadata: entry.metadata.into_iter().collect(),
            timestamp: entry.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_state_roundtrip() {
        let state = ModuleState::new("w1", "a1", "echo_module", ModuleStatus::Running, 100)
            .with_detail("source", "rest");
        let proto: proto::ModuleState = state.clone().into();
        assert_eq!(proto.state, "running");

        let back = ModuleState::try_from(proto).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let mut proto: proto::ModuleState =
            ModuleState::new("w1", "a1", "m", ModuleStatus::Created, 0).into();
        proto.state = "exploded".into();
        assert!(matches!(
            ModuleState::try_from(proto).unwrap_err(),
            DbosError::InvalidArgument(_)
        ));
    }

    #[test]
    fn task_status_roundtrip() {
        let mut task = Task::new("t1", "a1", "ping_module", vec![], 10, 5);
        task.status = TaskStatus::InFlight;
        let proto: proto::Task = task.clone().into();
        assert_eq!(proto.status, "in-flight");
        assert_eq!(Task::try_from(proto).unwrap(), task);
    }

    #[test]
    fn agent_roundtrip() {
        let mut agent = Agent::new("a1", "host", 7);
        agent.config.insert("region".into(), "eu".into());
        let proto: proto::Agent = agent.clone().into();
        assert_eq!(Agent::from(proto), agent);
    }

    #[test]
    fn event_roundtrip() {
        let entry = EventLogEntry::new(EventKind::Timeout, "deadline", 9).with_meta("rid", "w1");
        let proto: proto::EventLogEntry = entry.clone().into();
        assert_eq!(proto.kind, "timeout");
        assert_eq!(EventLogEntry::try_from(proto).unwrap(), entry);
    }
}
