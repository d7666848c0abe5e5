use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;

use imn_model::{Agent, EventLogEntry, MeasurementResult, ModuleState, Task};

use crate::api::DbosApi;
use crate::proto::{self, dbos_service_client::DbosServiceClient};
use crate::DbosError;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// gRPC client for the state store.
///
/// Transport errors are retried with capped exponential backoff; semantic
/// errors (not-found, invalid-transition, version-conflict) surface
/// unchanged on the first attempt. Deadlines are the caller's: wrap calls
/// in `tokio::time::timeout` or drop the future to cancel.
#[derive(Clone)]
pub struct DbosClient {
    inner: DbosServiceClient<Channel>,
}

impl DbosClient {
    /// Connect to a `DBOS_ADDRESS`-style endpoint, e.g.
    /// `http://127.0.0.1:50051`.
    pub async fn connect(endpoint: String) -> Result<Self, DbosError> {
        let inner = DbosServiceClient::connect(endpoint)
            .await
            .map_err(|e| DbosError::Transport(e.to_string()))?;
        Ok(Self { inner })
    }

    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T, DbosError>
    where
        F: FnMut(DbosServiceClient<Channel>) -> Fut,
        Fut: Future<Output = Result<T, tonic::Status>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call(self.inner.clone()).await {
                Ok(value) => return Ok(value),
                Err(status) => {
                    let err = DbosError::from(status);
                    if !err.is_transient() || attempt >= RETRY_ATTEMPTS {
                        return Err(err);
                    }
                    tracing::warn!(attempt, error = %err, "transient dbos error, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                }
            }
        }
    }
}

fn required<T>(value: Option<T>, what: &str) -> Result<T, DbosError> {
    value.ok_or_else(|| DbosError::Internal(format!("missing {what} in response")))
}

#[async_trait]
impl DbosApi for DbosClient {
    async fn register_agent(&self, agent: Agent) -> Result<(), DbosError> {
        let req = proto::RegisterAgentRequest {
            agent: Some(agent.into()),
        };
        self.with_retry(move |mut c| {
            let req = req.clone();
            async move { c.register_agent(req).await.map(|r| r.into_inner()) }
        })
        .await?;
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Agent, DbosError> {
        let req = proto::GetAgentRequest {
            agent_id: agent_id.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.get_agent(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        Ok(required(resp.agent, "agent")?.into())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, DbosError> {
        let resp = self
            .with_retry(move |mut c| async move {
                c.list_agents(proto::ListAgentsRequest {})
                    .await
                    .map(|r| r.into_inner())
            })
            .await?;
        Ok(resp.agents.into_iter().map(Into::into).collect())
    }

    async fn set_module_state(&self, state: ModuleState) -> Result<ModuleState, DbosError> {
        let req = proto::SetModuleStateRequest {
            state: Some(state.into()),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.set_module_state(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        required(resp.state, "state")?.try_into()
    }

    async fn set_module_state_with_version(
        &self,
        state: ModuleState,
        expected: i64,
    ) -> Result<ModuleState, DbosError> {
        let req = proto::SetModuleStateWithVersionRequest {
            state: Some(state.into()),
            expected_version: expected,
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move {
                    c.set_module_state_with_version(req)
                        .await
                        .map(|r| r.into_inner())
                }
            })
            .await?;
        required(resp.state, "state")?.try_into()
    }

    async fn get_module_state(&self, request_id: &str) -> Result<ModuleState, DbosError> {
        let req = proto::GetModuleStateRequest {
            request_id: request_id.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.get_module_state(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        required(resp.state, "state")?.try_into()
    }

    async fn list_module_states(
        &self,
        agent_id: &str,
        module_name: &str,
    ) -> Result<Vec<ModuleState>, DbosError> {
        let req = proto::ListModuleStatesRequest {
            agent_id: agent_id.to_string(),
            module_name: module_name.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.list_module_states(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        resp.states.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_all_module_states(&self) -> Result<Vec<ModuleState>, DbosError> {
        let resp = self
            .with_retry(move |mut c| async move {
                c.list_all_module_states(proto::ListAllModuleStatesRequest {})
                    .await
                    .map(|r| r.into_inner())
            })
            .await?;
        resp.states.into_iter().map(TryInto::try_into).collect()
    }

    async fn store_result(&self, result: MeasurementResult) -> Result<bool, DbosError> {
        let req = proto::StoreResultRequest {
            result: Some(result.into()),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.store_result(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        Ok(resp.stored)
    }

    async fn get_result(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<MeasurementResult, DbosError> {
        let req = proto::GetResultRequest {
            agent_id: agent_id.to_string(),
            request_id: request_id.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.get_result(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        Ok(required(resp.result, "result")?.into())
    }

    async fn list_results(&self, agent_id: &str) -> Result<Vec<MeasurementResult>, DbosError> {
        let req = proto::ListResultsRequest {
            agent_id: agent_id.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.list_results(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        Ok(resp.results.into_iter().map(Into::into).collect())
    }

    async fn delete_result(&self, agent_id: &str, request_id: &str) -> Result<bool, DbosError> {
        let req = proto::DeleteResultRequest {
            agent_id: agent_id.to_string(),
            request_id: request_id.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.delete_result(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        Ok(resp.existed)
    }

    async fn schedule_task(&self, task: Task) -> Result<(), DbosError> {
        let req = proto::ScheduleTaskRequest {
            task: Some(task.into()),
        };
        self.with_retry(move |mut c| {
            let req = req.clone();
            async move { c.schedule_task(req).await.map(|r| r.into_inner()) }
        })
        .await?;
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, DbosError> {
        let req = proto::GetTaskRequest {
            task_id: task_id.to_string(),
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.get_task(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        required(resp.task, "task")?.try_into()
    }

    async fn list_due_tasks(
        &self,
        now: i64,
        visibility_timeout: Duration,
    ) -> Result<Vec<Task>, DbosError> {
        let req = proto::ListDueTasksRequest {
            now,
            visibility_timeout_s: visibility_timeout.as_secs() as i64,
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.list_due_tasks(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        resp.tasks.into_iter().map(TryInto::try_into).collect()
    }

    async fn ack_task(&self, task_id: &str) -> Result<(), DbosError> {
        let req = proto::AckTaskRequest {
            task_id: task_id.to_string(),
        };
        self.with_retry(move |mut c| {
            let req = req.clone();
            async move { c.ack_task(req).await.map(|r| r.into_inner()) }
        })
        .await?;
        Ok(())
    }

    async fn nack_task(
        &self,
        task_id: &str,
        retry_delay: Duration,
        now: i64,
    ) -> Result<Task, DbosError> {
        let req = proto::NackTaskRequest {
            task_id: task_id.to_string(),
            retry_delay_s: retry_delay.as_secs() as i64,
            now,
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.nack_task(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        required(resp.task, "task")?.try_into()
    }

    async fn requeue_expired_tasks(&self, now: i64) -> Result<usize, DbosError> {
        let req = proto::RequeueExpiredTasksRequest { now };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.requeue_expired_tasks(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        Ok(resp.requeued.max(0) as usize)
    }

    async fn log_event(&self, entry: EventLogEntry) -> Result<(), DbosError> {
        let req = proto::LogEventRequest {
            event: Some(entry.into()),
        };
        self.with_retry(move |mut c| {
            let req = req.clone();
            async move { c.log_event(req).await.map(|r| r.into_inner()) }
        })
        .await?;
        Ok(())
    }

    async fn get_events(&self, limit: usize) -> Result<Vec<EventLogEntry>, DbosError> {
        let req = proto::GetEventsRequest {
            limit: limit as i64,
        };
        let resp = self
            .with_retry(move |mut c| {
                let req = req.clone();
                async move { c.get_events(req).await.map(|r| r.into_inner()) }
            })
            .await?;
        resp.events.into_iter().map(TryInto::try_into).collect()
    }
}
