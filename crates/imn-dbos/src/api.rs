use std::time::Duration;

use async_trait::async_trait;
use imn_model::{Agent, EventLogEntry, MeasurementResult, ModuleState, Task};
use imn_store::Store;

use crate::DbosError;

/// State store seam.
///
/// The coordinator and the task pump talk to this trait only; it is
/// implemented by [`crate::DbosClient`] over gRPC and by [`DirectDbos`]
/// in-process, so everything above it runs unchanged against either.
#[async_trait]
pub trait DbosApi: Send + Sync + 'static {
    async fn register_agent(&self, agent: Agent) -> Result<(), DbosError>;
    async fn get_agent(&self, agent_id: &str) -> Result<Agent, DbosError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, DbosError>;

    /// Persist a transition; returns the stored record with its assigned
    /// version.
    async fn set_module_state(&self, state: ModuleState) -> Result<ModuleState, DbosError>;
    async fn set_module_state_with_version(
        &self,
        state: ModuleState,
        expected: i64,
    ) -> Result<ModuleState, DbosError>;
    async fn get_module_state(&self, request_id: &str) -> Result<ModuleState, DbosError>;
    async fn list_module_states(
        &self,
        agent_id: &str,
        module_name: &str,
    ) -> Result<Vec<ModuleState>, DbosError>;
    async fn list_all_module_states(&self) -> Result<Vec<ModuleState>, DbosError>;

    /// Idempotent; returns `false` when the write was suppressed by the
    /// idempotency mark.
    async fn store_result(&self, result: MeasurementResult) -> Result<bool, DbosError>;
    async fn get_result(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<MeasurementResult, DbosError>;
    async fn list_results(&self, agent_id: &str) -> Result<Vec<MeasurementResult>, DbosError>;
    async fn delete_result(&self, agent_id: &str, request_id: &str) -> Result<bool, DbosError>;

    async fn schedule_task(&self, task: Task) -> Result<(), DbosError>;
    async fn get_task(&self, task_id: &str) -> Result<Task, DbosError>;
    async fn list_due_tasks(
        &self,
        now: i64,
        visibility_timeout: Duration,
    ) -> Result<Vec<Task>, DbosError>;
    async fn ack_task(&self, task_id: &str) -> Result<(), DbosError>;
    async fn nack_task(
        &self,
        task_id: &str,
        retry_delay: Duration,
        now: i64,
    ) -> Result<Task, DbosError>;
    async fn requeue_expired_tasks(&self, now: i64) -> Result<usize, DbosError>;

    async fn log_event(&self, entry: EventLogEntry) -> Result<(), DbosError>;
    async fn get_events(&self, limit: usize) -> Result<Vec<EventLogEntry>, DbosError>;
}

/// In-process implementation backed directly by the store.
#[derive(Clone)]
pub struct DirectDbos {
    store: Store,
}

impl DirectDbos {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DbosApi for DirectDbos {
    async fn register_agent(&self, agent: Agent) -> Result<(), DbosError> {
        Ok(self.store.agents.register(&agent).await?)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Agent, DbosError> {
        Ok(self.store.agents.get(agent_id).await?)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, DbosError> {
        Ok(self.store.agents.list().await?)
    }

    async fn set_module_state(&self, state: ModuleState) -> Result<ModuleState, DbosError> {
        Ok(self.store.module_states.set(&state).await?)
    }

    async fn set_module_state_with_version(
        &self,
        state: ModuleState,
        expected: i64,
    ) -> Result<ModuleState, DbosError> {
        Ok(self
            .store
            .module_states
            .set_with_version(&state, expected)
            .await?)
    }

    async fn get_module_state(&self, request_id: &str) -> Result<ModuleState, DbosError> {
        Ok(self.store.module_states.get(request_id).await?)
    }

    async fn list_module_states(
        &self,
        agent_id: &str,
        module_name: &str,
    ) -> Result<Vec<ModuleState>, DbosError> {
        Ok(self.store.module_states.list(agent_id, module_name).await?)
    }

    async fn list_all_module_states(&self) -> Result<Vec<ModuleState>, DbosError> {
        Ok(self.store.module_states.list_all().await?)
    }

    async fn store_result(&self, result: MeasurementResult) -> Result<bool, DbosError> {
        Ok(self.store.results.store(&result).await?)
    }

    async fn get_result(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<MeasurementResult, DbosError> {
        Ok(self.store.results.get(agent_id, request_id).await?)
    }

    async fn list_results(&self, agent_id: &str) -> Result<Vec<MeasurementResult>, DbosError> {
        Ok(self.store.results.list(agent_id).await?)
    }

    async fn delete_result(&self, agent_id: &str, request_id: &str) -> Result<bool, DbosError> {
        Ok(self.store.results.delete(agent_id, request_id).await?)
    }

    async fn schedule_task(&self, task: Task) -> Result<(), DbosError> {
        Ok(self.store.tasks.schedule(&task).await?)
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, DbosError> {
        Ok(self.store.tasks.get(task_id).await?)
    }

    async fn list_due_tasks(
        &self,
        now: i64,
        visibility_timeout: Duration,
    ) -> Result<Vec<Task>, DbosError> {
        Ok(self.store.tasks.claim_due(now, visibility_timeout).await?)
    }

    async fn ack_task(&self, task_id: &str) -> Result<(), DbosError> {
        Ok(self.store.tasks.ack(task_id).await?)
    }

    async fn nack_task(
        &self,
        task_id: &str,
        retry_delay: Duration,
        now: i64,
    ) -> Result<Task, DbosError> {
        Ok(self.store.tasks.nack(task_id, retry_delay, now).await?)
    }

    async fn requeue_expired_tasks(&self, now: i64) -> Result<usize, DbosError> {
        Ok(self.store.tasks.requeue_expired(now).await?)
    }

    async fn log_event(&self, entry: EventLogEntry) -> Result<(), DbosError> {
        Ok(self.store.events.log(&entry).await?)
    }

    async fn get_events(&self, limit: usize) -> Result<Vec<EventLogEntry>, DbosError> {
        Ok(self.store.events.recent(limit).await?)
    }
}
