use std::time::Duration;

use tonic::{Request, Response, Status};

use imn_model::{Agent, EventLogEntry, ModuleState, Task};
use imn_store::Store;

use crate::proto::{self, dbos_service_server::DbosService};
use crate::DbosError;

/// gRPC front of the store. One instance serves every coordinator.
pub struct DbosGrpcService {
    store: Store,
}

impl DbosGrpcService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

fn map_err(e: imn_store::StoreError) -> Status {
    Status::from(DbosError::from(e))
}

#[tonic::async_trait]
impl DbosService for DbosGrpcService {
    async fn register_agent(
        &self,
        request: Request<proto::RegisterAgentRequest>,
    ) -> Result<Response<proto::RegisterAgentResponse>, Status> {
        let agent = request
            .into_inner()
            .agent
            .ok_or_else(|| Status::invalid_argument("missing agent"))?;
        let agent = Agent::from(agent);
        if agent.id.trim().is_empty() {
            return Err(Status::invalid_argument("agent id cannot be empty"));
        }

        self.store.agents.register(&agent).await.map_err(map_err)?;
        Ok(Response::new(proto::RegisterAgentResponse {}))
    }

    async fn get_agent(
        &self,
        request: Request<proto::GetAgentRequest>,
    ) -> Result<Response<proto::GetAgentResponse>, Status> {
        let req = request.into_inner();
        let agent = self.store.agents.get(&req.agent_id).await.map_err(map_err)?;
        Ok(Response::new(proto::GetAgentResponse {
            agent: Some(agent.into()),
        }))
    }

    async fn list_agents(
        &self,
        _request: Request<proto::ListAgentsRequest>,
    ) -> Result<Response<proto::ListAgentsResponse>, Status> {
        let agents = self.store.agents.list().await.map_err(map_err)?;
        Ok(Response::new(proto::ListAgentsResponse {
            agents: agents.into_iter().map(Into::into).collect(),
        }))
    }

    async fn set_module_state(
        &self,
        request: Request<proto::SetModuleStateRequest>,
    ) -> Result<Response<proto::SetModuleStateResponse>, Status> {
        let state = request
            .into_inner()
            .state
            .ok_or_else(|| Status::invalid_argument("missing state"))?;
        let state = ModuleState::try_from(state).map_err(Status::from)?;

        let stored = self.store.module_states.set(&state).await.map_err(map_err)?;
        Ok(Response::new(proto::SetModuleStateResponse {
            state: Some(stored.into()),
        }))
    }

    async fn set_module_state_with_version(
        &self,
        request: Request<proto::SetModuleStateWithVersionRequest>,
    ) -> Result<Response<proto::SetModuleStateResponse>, Status> {
        let req = request.into_inner();
        let state = req
            .state
            .ok_or_else(|| Status::invalid_argument("missing state"))?;
        let state = ModuleState::try_from(state).map_err(Status::from)?;

        let stored = self
            .store
            .module_states
            .set_with_version(&state, req.expected_version)
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::SetModuleStateResponse {
            state: Some(stored.into()),
        }))
    }

    async fn get_module_state(
        &self,
        request: Request<proto::GetModuleStateRequest>,
    ) -> Result<Response<proto::GetModuleStateResponse>, Status> {
        let req = request.into_inner();
        let state = self
            .store
            .module_states
            .get(&req.request_id)
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::GetModuleStateResponse {
            state: Some(state.into()),
        }))
    }

    async fn list_module_states(
        &self,
        request: Request<proto::ListModuleStatesRequest>,
    ) -> Result<Response<proto::ListModuleStatesResponse>, Status> {
        let req = request.into_inner();
        let states = self
            .store
            .module_states
            .list(&req.agent_id, &req.module_name)
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::ListModuleStatesResponse {
            states: states.into_iter().map(Into::into).collect(),
        }))
    }

    async fn list_all_module_states(
        &self,
        _request: Request<proto::ListAllModuleStatesRequest>,
    ) -> Result<Response<proto::ListModuleStatesResponse>, Status> {
        let states = self.store.module_states.list_all().await.map_err(map_err)?;
        Ok(Response::new(proto::ListModuleStatesResponse {
            states: states.into_iter().map(Into::into).collect(),
        }))
    }

    async fn store_result(
        &self,
        request: Request<proto::StoreResultRequest>,
    ) -> Result<Response<proto::StoreResultResponse>, Status> {
        let result = request
            .into_inner()
            .result
            .ok_or_else(|| Status::invalid_argument("missing result"))?;
        let stored = self
            .store
            .results
            .store(&result.into())
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::StoreResultResponse { stored }))
    }

    async fn get_result(
        &self,
        request: Request<proto::GetResultRequest>,
    ) -> Result<Response<proto::GetResultResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .store
            .results
            .get(&req.agent_id, &req.request_id)
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::GetResultResponse {
            result: Some(result.into()),
        }))
    }

    async fn list_results(
        &self,
        request: Request<proto::ListResultsRequest>,
    ) -> Result<Response<proto::ListResultsResponse>, Status> {
        let req = request.into_inner();
        let results = self.store.results.list(&req.agent_id).await.map_err(map_err)?;
        Ok(Response::new(proto::ListResultsResponse {
            results: results.into_iter().map(Into::into).collect(),
        }))
    }

    async fn delete_result(
        &self,
        request: Request<proto::DeleteResultRequest>,
    ) -> Result<Response<proto::DeleteResultResponse>, Status> {
        let req = request.into_inner();
        let existed = self
            .store
            .results
            .delete(&req.agent_id, &req.request_id)
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::DeleteResultResponse { existed }))
    }

    async fn schedule_task(
        &self,
        request: Request<proto::ScheduleTaskRequest>,
    ) -> Result<Response<proto::ScheduleTaskResponse>, Status> {
        let task = request
            .into_inner()
            .task
            .ok_or_else(|| Status::invalid_argument("missing task"))?;
        let task = Task::try_from(task).map_err(Status::from)?;
        if task.id.trim().is_empty() {
            return Err(Status::invalid_argument("task id cannot be empty"));
        }

        self.store.tasks.schedule(&task).await.map_err(map_err)?;
        Ok(Response::new(proto::ScheduleTaskResponse {}))
    }

    async fn get_task(
        &self,
        request: Request<proto::GetTaskRequest>,
    ) -> Result<Response<proto::GetTaskResponse>, Status> {
        let req = request.into_inner();
        let task = self.store.tasks.get(&req.task_id).await.map_err(map_err)?;
        Ok(Response::new(proto::GetTaskResponse {
            task: Some(task.into()),
        }))
    }

    async fn list_due_tasks(
        &self,
        request: Request<proto::ListDueTasksRequest>,
    ) -> Result<Response<proto::ListDueTasksResponse>, Status> {
        let req = request.into_inner();
        if req.visibility_timeout_s <= 0 {
            return Err(Status::invalid_argument("visibility timeout must be positive"));
        }

        let tasks = self
            .store
            .tasks
            .claim_due(req.now, Duration::from_secs(req.visibility_timeout_s as u64))
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::ListDueTasksResponse {
            tasks: tasks.into_iter().map(Into::into).collect(),
        }))
    }

    async fn ack_task(
        &self,
        request: Request<proto::AckTaskRequest>,
    ) -> Result<Response<proto::AckTaskResponse>, Status> {
        let req = request.into_inner();
        self.store.tasks.ack(&req.task_id).await.map_err(map_err)?;
        Ok(Response::new(proto::AckTaskResponse {}))
    }

    async fn nack_task(
        &self,
        request: Request<proto::NackTaskRequest>,
    ) -> Result<Response<proto::NackTaskResponse>, Status> {
        let req = request.into_inner();
        if req.retry_delay_s < 0 {
            return Err(Status::invalid_argument("retry delay cannot be negative"));
        }

        let task = self
            .store
            .tasks
            .nack(
                &req.task_id,
                Duration::from_secs(req.retry_delay_s as u64),
                req.now,
            )
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::NackTaskResponse {
            task: Some(task.into()),
        }))
    }

    async fn requeue_expired_tasks(
        &self,
        request: Request<proto::RequeueExpiredTasksRequest>,
    ) -> Result<Response<proto::RequeueExpiredTasksResponse>, Status> {
        let req = request.into_inner();
        let requeued = self
            .store
            .tasks
            .requeue_expired(req.now)
            .await
            .map_err(map_err)?;
        Ok(Response::new(proto::RequeueExpiredTasksResponse {
            requeued: requeued as i64,
        }))
    }

    async fn log_event(
        &self,
        request: Request<proto::LogEventRequest>,
    ) -> Result<Response<proto::LogEventResponse>, Status> {
        let event = request
            .into_inner()
            .event
            .ok_or_else(|| Status::invalid_argument("missing event"))?;
        let event = EventLogEntry::try_from(event).map_err(Status::from)?;

        self.store.events.log(&event).await.map_err(map_err)?;
        Ok(Response::new(proto::LogEventResponse {}))
    }

    async fn get_events(
        &self,
        request: Request<proto::GetEventsRequest>,
    ) -> Result<Response<proto::GetEventsResponse>, Status> {
        let req = request.into_inner();
        let limit = req.limit.clamp(0, 1_000) as usize;
        let events = self.store.events.recent(limit).await.map_err(map_err)?;
        Ok(Response::new(proto::GetEventsResponse {
            events: events.into_iter().map(Into::into).collect(),
        }))
    }
}
