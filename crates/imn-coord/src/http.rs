//! REST surface.
//!
//! Thin translation layer: handlers parse the request, call into the
//! coordinator or the DBOS seam, and map outcomes to status codes. No
//! workflow rules live here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use imn_dbos::DbosApi;
use imn_model::{MeasurementResult, ModuleStatus, Task, now_unix};

use crate::coordinator::{Coordinator, SubmitOutcome, SubmitRequest};
use crate::CoordError;

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/agents", get(list_agents))
        .route("/agents/alive", get(list_alive_agents))
        .route("/agents/{id}", get(get_agent))
        .route("/agent/{id}/{module}", post(submit_sync))
        .route("/agent/{id}/{module}/async", post(submit_async))
        .route("/agent/{id}/{module}/schedule", post(schedule))
        .route("/workflows", get(list_workflows))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/cancel", post(cancel_workflow))
        .route("/agents/{id}/results", get(list_results))
        .route(
            "/agents/{id}/results/{rid}",
            get(get_result).delete(delete_result),
        )
        .route("/modules/states/{rid}", get(get_workflow))
        .route("/tasks/{id}", get(get_task))
        .route("/events", get(get_events))
        .route("/metrics", get(metrics))
        .with_state(coordinator)
}

// ============================================================================
// Agents
// ============================================================================

async fn health(State(coordinator): State<Arc<Coordinator>>) -> Result<Response, CoordError> {
    let now = now_unix();
    let window = coordinator.config().liveness_window_secs;

    let agents = coordinator.dbos().list_agents().await?;
    let alive = agents.iter().filter(|a| a.is_alive(now, window)).count();

    let states = coordinator.dbos().list_all_module_states().await?;
    let terminal = states.iter().filter(|s| s.is_terminal()).count();

    Ok(Json(json!({
        "status": "ok",
        "total_agents": agents.len(),
        "alive_agents": alive,
        "total_workflows": states.len(),
        "active_workflows": states.len() - terminal,
    }))
    .into_response())
}

async fn list_agents(
    State(coordinator): State<Arc<Coordinator>>,
) -> Result<Response, CoordError> {
    let now = now_unix();
    let window = coordinator.config().liveness_window_secs;
    let mut agents = coordinator.dbos().list_agents().await?;
    for agent in &mut agents {
        agent.alive = agent.is_alive(now, window);
    }
    Ok(Json(agents).into_response())
}

async fn list_alive_agents(
    State(coordinator): State<Arc<Coordinator>>,
) -> Result<Response, CoordError> {
    let now = now_unix();
    let window = coordinator.config().liveness_window_secs;
    let mut agents = coordinator.dbos().list_agents().await?;
    agents.retain(|agent| agent.is_alive(now, window));
    for agent in &mut agents {
        agent.alive = true;
    }
    Ok(Json(agents).into_response())
}

async fn get_agent(
    State(coordinator): State<Arc<Coordinator>>,
    Path(agent_id): Path<String>,
) -> Result<Response, CoordError> {
    let mut agent = coordinator.dbos().get_agent(&agent_id).await?;
    agent.alive = agent.is_alive(now_unix(), coordinator.config().liveness_window_secs);
    Ok(Json(agent).into_response())
}

// ============================================================================
// Measurements
// ============================================================================

fn submit_request(agent_id: String, module_name: String, body: Value) -> SubmitRequest {
    let request_id = body
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);
    SubmitRequest {
        agent_id,
        module_name,
        payload: body,
        request_id,
    }
}

fn submit_response(outcome: SubmitOutcome) -> Response {
    match outcome {
        SubmitOutcome::Completed { request_id, result } => (
            StatusCode::OK,
            Json(json!({"id": request_id, "state": "completed", "result": result})),
        )
            .into_response(),
        SubmitOutcome::HandlerError { request_id, error } => (
            StatusCode::OK,
            Json(json!({
                "id": request_id,
                "state": "error",
                "error": error.error,
                "details": error.details,
            })),
        )
            .into_response(),
        SubmitOutcome::Failed { request_id, state } => (
            StatusCode::OK,
            Json(json!({
                "id": request_id,
                "state": state.state,
                "error": state.error_message,
            })),
        )
            .into_response(),
        SubmitOutcome::Pending { request_id, state } => (
            StatusCode::ACCEPTED,
            Json(json!({"id": request_id, "state": state.state})),
        )
            .into_response(),
        SubmitOutcome::Cancelled { request_id } => (
            StatusCode::OK,
            Json(json!({"id": request_id, "state": "failed", "cancelled": true})),
        )
            .into_response(),
    }
}

/// POST /agent/{id}/{module} — synchronous measurement.
async fn submit_sync(
    State(coordinator): State<Arc<Coordinator>>,
    Path((agent_id, module_name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, CoordError> {
    let outcome = coordinator
        .submit_sync(submit_request(agent_id, module_name, body))
        .await?;
    Ok(submit_response(outcome))
}

/// POST /agent/{id}/{module}/async — returns the workflow id immediately.
async fn submit_async(
    State(coordinator): State<Arc<Coordinator>>,
    Path((agent_id, module_name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, CoordError> {
    let request_id = coordinator
        .submit_async(submit_request(agent_id, module_name, body))
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"id": request_id}))).into_response())
}

#[derive(Debug, Deserialize)]
struct ScheduleParams {
    /// Unix seconds the task becomes due; defaults to now.
    at: Option<i64>,
    task_id: Option<String>,
}

/// POST /agent/{id}/{module}/schedule — persist a task for the pump.
async fn schedule(
    State(coordinator): State<Arc<Coordinator>>,
    Path((agent_id, module_name)): Path<(String, String)>,
    Query(params): Query<ScheduleParams>,
    Json(body): Json<Value>,
) -> Result<Response, CoordError> {
    let request = SubmitRequest {
        agent_id,
        module_name,
        payload: body,
        request_id: params.task_id,
    };
    let task = coordinator.schedule(request, params.at).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"task_id": task.id, "scheduled_at": task.scheduled_at})),
    )
        .into_response())
}

// ============================================================================
// Workflows
// ============================================================================

#[derive(Debug, Deserialize)]
struct WorkflowsQuery {
    /// `terminal`, `active`, or an exact state name.
    status: Option<String>,
}

async fn list_workflows(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<WorkflowsQuery>,
) -> Result<Response, CoordError> {
    let mut states = coordinator.dbos().list_all_module_states().await?;

    if let Some(filter) = query.status {
        match filter.as_str() {
            "terminal" => states.retain(|s| s.is_terminal()),
            "active" => states.retain(|s| !s.is_terminal()),
            other => {
                let status = ModuleStatus::parse(other).ok_or_else(|| {
                    CoordError::Validation(format!(
                        "invalid status '{other}' (valid: created, started, running, completed, error, failed, terminal, active)"
                    ))
                })?;
                states.retain(|s| s.state == status);
            }
        }
    }

    Ok(Json(states).into_response())
}

async fn get_workflow(
    State(coordinator): State<Arc<Coordinator>>,
    Path(request_id): Path<String>,
) -> Result<Response, CoordError> {
    let state = coordinator.dbos().get_module_state(&request_id).await?;
    Ok(Json(state).into_response())
}

async fn cancel_workflow(
    State(coordinator): State<Arc<Coordinator>>,
    Path(request_id): Path<String>,
) -> Result<Response, CoordError> {
    let state = coordinator.cancel_workflow(&request_id).await?;
    Ok(Json(state).into_response())
}

// ============================================================================
// Results
// ============================================================================

fn result_body(result: MeasurementResult) -> Value {
    let payload: Value = serde_json::from_slice(&result.data).unwrap_or(Value::Null);
    json!({
        "id": result.id,
        "agent_id": result.agent_id,
        "module_name": result.module_name,
        "payload": payload,
        "created_at": result.created_at,
        "received_at": result.received_at,
        "server_id": result.server_id,
        "source": result.source,
    })
}

async fn list_results(
    State(coordinator): State<Arc<Coordinator>>,
    Path(agent_id): Path<String>,
) -> Result<Response, CoordError> {
    let results = coordinator.dbos().list_results(&agent_id).await?;
    let bodies: Vec<Value> = results.into_iter().map(result_body).collect();
    Ok(Json(bodies).into_response())
}

async fn get_result(
    State(coordinator): State<Arc<Coordinator>>,
    Path((agent_id, request_id)): Path<(String, String)>,
) -> Result<Response, CoordError> {
    let result = coordinator.dbos().get_result(&agent_id, &request_id).await?;
    Ok(Json(result_body(result)).into_response())
}

async fn delete_result(
    State(coordinator): State<Arc<Coordinator>>,
    Path((agent_id, request_id)): Path<(String, String)>,
) -> Result<Response, CoordError> {
    let existed = coordinator
        .dbos()
        .delete_result(&agent_id, &request_id)
        .await?;
    if !existed {
        return Err(CoordError::NotFound(format!(
            "result {agent_id}/{request_id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ============================================================================
// Tasks, events, metrics
// ============================================================================

fn task_body(task: Task) -> Value {
    let payload: Value = serde_json::from_slice(&task.payload).unwrap_or(Value::Null);
    json!({
        "id": task.id,
        "agent_id": task.agent_id,
        "module_name": task.module_name,
        "payload": payload,
        "scheduled_at": task.scheduled_at,
        "created_at": task.created_at,
        "status": task.status,
        "visible_at": task.visible_at,
        "retry_count": task.retry_count,
    })
}

async fn get_task(
    State(coordinator): State<Arc<Coordinator>>,
    Path(task_id): Path<String>,
) -> Result<Response, CoordError> {
    let task = coordinator.dbos().get_task(&task_id).await?;
    Ok(Json(task_body(task)).into_response())
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn get_events(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, CoordError> {
    let limit = query.limit.unwrap_or(50).min(1_000);
    let events = coordinator.dbos().get_events(limit).await?;
    Ok(Json(events).into_response())
}

async fn metrics(State(coordinator): State<Arc<Coordinator>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        coordinator.metrics().gather_text(),
    )
        .into_response()
}
