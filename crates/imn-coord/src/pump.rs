use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use imn_dbos::DbosApi;
use imn_model::{Task, now_unix};

use crate::coordinator::{Coordinator, SubmitOutcome, SubmitRequest};

/// Scheduled-task executor.
///
/// Periodically claims due tasks (which hides them behind the visibility
/// timeout), runs each as a synchronous workflow and acks or nacks on the
/// outcome. A task that keeps failing walks its retry ceiling in the store
/// and ends up dead-lettered.
pub struct TaskPump {
    coordinator: Arc<Coordinator>,
    cancel: CancellationToken,
}

impl TaskPump {
    pub fn new(coordinator: Arc<Coordinator>, cancel: CancellationToken) -> Self {
        Self {
            coordinator,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.coordinator.config().task_poll_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        let config = self.coordinator.config();
        let claimed = match self
            .coordinator
            .dbos()
            .list_due_tasks(now_unix(), config.visibility_timeout)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "task claim failed");
                return;
            }
        };

        for task in claimed {
            self.run_task(task).await;
        }
    }

    async fn run_task(&self, task: Task) {
        let payload = match serde_json::from_slice(&task.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "task payload undecodable, nacking");
                self.nack(&task).await;
                return;
            }
        };

        // Fresh workflow id per attempt; the task id stays the stable
        // handle while each execution is its own workflow.
        let request = SubmitRequest {
            agent_id: task.agent_id.clone(),
            module_name: task.module_name.clone(),
            payload,
            request_id: Some(format!("{}-r{}", task.id, task.retry_count)),
        };

        match self.coordinator.submit_sync(request).await {
            Ok(SubmitOutcome::Completed { request_id, .. }) => {
                info!(task_id = %task.id, %request_id, "task completed");
                if let Err(e) = self.coordinator.dbos().ack_task(&task.id).await {
                    warn!(task_id = %task.id, error = %e, "ack failed");
                }
            }
            Ok(outcome) => {
                debug!(task_id = %task.id, ?outcome, "task attempt did not complete");
                self.nack(&task).await;
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "task attempt failed");
                self.nack(&task).await;
            }
        }
    }

    async fn nack(&self, task: &Task) {
        let config = self.coordinator.config();
        match self
            .coordinator
            .dbos()
            .nack_task(&task.id, config.task_retry_delay, now_unix())
            .await
        {
            Ok(updated) => debug!(task_id = %task.id, status = %updated.status, retries = updated.retry_count, "task nacked"),
            Err(e) => warn!(task_id = %task.id, error = %e, "nack failed"),
        }
    }
}
