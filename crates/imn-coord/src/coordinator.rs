use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use imn_bus::subject::{self, ReplyKind};
use imn_bus::{Bus, HeaderMap, Message, trace};
use imn_dbos::{DbosApi, DbosError};
use imn_model::wire::{ErrorReply, Heartbeat, StateBroadcast};
use imn_model::{
    Agent, EventKind, EventLogEntry, MeasurementResult, ModuleSpec, ModuleState, ModuleStatus,
    Task, find_module, now_unix,
};

use crate::rendezvous::{Outcome, Rendezvous};
use crate::{CoordConfig, CoordError, Metrics};

/// A measurement request as accepted from the REST surface or task pump.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub agent_id: String,
    pub module_name: String,
    pub payload: Value,
    pub request_id: Option<String>,
}

/// What a submit resolves to.
#[derive(Debug)]
pub enum SubmitOutcome {
    Completed { request_id: String, result: Value },
    HandlerError { request_id: String, error: ErrorReply },
    /// Duplicate of a workflow that already reached `error`/`failed`.
    Failed { request_id: String, state: ModuleState },
    /// Duplicate of a workflow still in progress.
    Pending { request_id: String, state: ModuleState },
    Cancelled { request_id: String },
}

impl SubmitOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            SubmitOutcome::Completed { request_id, .. }
            | SubmitOutcome::HandlerError { request_id, .. }
            | SubmitOutcome::Failed { request_id, .. }
            | SubmitOutcome::Pending { request_id, .. }
            | SubmitOutcome::Cancelled { request_id } => request_id,
        }
    }
}

enum Prepared {
    Fresh {
        request_id: String,
        spec: &'static ModuleSpec,
        agent_id: String,
        payload: Value,
    },
    Done(SubmitOutcome),
}

/// Decrements the per-agent outstanding-await counter on drop.
struct SlotGuard {
    inflight: Arc<Mutex<HashMap<String, usize>>>,
    agent_id: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(count) = inflight.get_mut(&self.agent_id) {
            *count -= 1;
            if *count == 0 {
                inflight.remove(&self.agent_id);
            }
        }
    }
}

/// The control-plane coordinator.
///
/// Owns the request-to-workflow mapping: idempotent acceptance, lifecycle
/// persistence through the DBOS seam, dispatch and rendezvous-based await,
/// timeout and cancellation, heartbeat consumption and restart recovery.
pub struct Coordinator {
    dbos: Arc<dyn DbosApi>,
    bus: Arc<dyn Bus>,
    config: CoordConfig,
    rendezvous: Rendezvous,
    inflight: Arc<Mutex<HashMap<String, usize>>>,
    metrics: Metrics,
    server_id: String,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        dbos: Arc<dyn DbosApi>,
        bus: Arc<dyn Bus>,
        config: CoordConfig,
    ) -> Result<Arc<Self>, CoordError> {
        let metrics = Metrics::new().map_err(|e| CoordError::Internal(e.to_string()))?;
        Ok(Arc::new(Self {
            dbos,
            bus,
            config,
            rendezvous: Rendezvous::new(),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            metrics,
            server_id: format!("coord-{}", uuid::Uuid::new_v4()),
            cancel: CancellationToken::new(),
        }))
    }

    pub fn dbos(&self) -> &Arc<dyn DbosApi> {
        &self.dbos
    }

    pub fn config(&self) -> &CoordConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run restart recovery, then spawn the bus consumers.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, CoordError> {
        self.recover().await?;

        let mut tasks = Vec::new();
        for pattern in ["agent.*.out", "agent.*.*.out", "agent.*.error", "agent.*.*.error"] {
            tasks.push(self.spawn_consumer(pattern, ConsumerKind::Reply).await?);
        }
        tasks.push(
            self.spawn_consumer(subject::MODULE_STATE, ConsumerKind::State)
                .await?,
        );
        for pattern in [subject::HEARTBEAT, subject::LEGACY_HEARTBEAT_WILDCARD] {
            tasks.push(self.spawn_consumer(pattern, ConsumerKind::Heartbeat).await?);
        }

        info!(server_id = %self.server_id, "coordinator started");
        Ok(tasks)
    }

    async fn spawn_consumer(
        self: &Arc<Self>,
        pattern: &str,
        kind: ConsumerKind,
    ) -> Result<JoinHandle<()>, CoordError> {
        let mut sub = self.bus.subscribe(pattern).await?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    msg = sub.next() => match msg {
                        Some(msg) => match kind {
                            ConsumerKind::Reply => this.on_reply(msg).await,
                            ConsumerKind::State => this.on_state(msg).await,
                            ConsumerKind::Heartbeat => this.on_heartbeat(msg).await,
                        },
                        None => return,
                    },
                }
            }
        }))
    }

    // ------------------------------------------------------------------
    // Submit paths
    // ------------------------------------------------------------------

    /// Synchronous submit: dispatch and wait for the outcome.
    pub async fn submit_sync(
        self: &Arc<Self>,
        request: SubmitRequest,
    ) -> Result<SubmitOutcome, CoordError> {
        match self.prepare(request).await? {
            Prepared::Done(outcome) => Ok(outcome),
            Prepared::Fresh {
                request_id,
                spec,
                agent_id,
                payload,
            } => {
                let _slot = self.acquire_slot(&agent_id)?;
                self.execute(&request_id, spec, &agent_id, payload).await
            }
        }
    }

    /// Asynchronous submit: returns the workflow id immediately; the await
    /// and persistence run in a background task.
    pub async fn submit_async(
        self: &Arc<Self>,
        request: SubmitRequest,
    ) -> Result<String, CoordError> {
        match self.prepare(request).await? {
            Prepared::Done(outcome) => Ok(outcome.request_id().to_string()),
            Prepared::Fresh {
                request_id,
                spec,
                agent_id,
                payload,
            } => {
                let slot = self.acquire_slot(&agent_id)?;
                let this = self.clone();
                let rid = request_id.clone();
                tokio::spawn(async move {
                    let _slot = slot;
                    if let Err(e) = this.execute(&rid, spec, &agent_id, payload).await {
                        warn!(request_id = %rid, error = %e, "async workflow failed");
                    }
                });
                Ok(request_id)
            }
        }
    }

    /// Validate a request and persist a task for later execution by the
    /// pump. No liveness check: the agent may well be back by the time the
    /// task is due.
    pub async fn schedule(
        &self,
        request: SubmitRequest,
        scheduled_at: Option<i64>,
    ) -> Result<Task, CoordError> {
        let spec = find_module(&request.module_name).ok_or_else(|| {
            CoordError::Validation(format!("unknown module '{}'", request.module_name))
        })?;
        let mut payload = request.payload;
        spec.schema
            .validate(&mut payload)
            .map_err(|e| CoordError::Validation(e.to_string()))?;

        let now = now_unix();
        let task = Task::new(
            request
                .request_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            request.agent_id,
            spec.name,
            serde_json::to_vec(&payload).map_err(|e| CoordError::Internal(e.to_string()))?,
            scheduled_at.unwrap_or(now),
            now,
        );
        self.dbos.schedule_task(task.clone()).await?;
        info!(task_id = %task.id, module = spec.name, "task scheduled");
        Ok(task)
    }

    /// Cancel a non-terminal workflow: force `failed` with a cancellation
    /// marker and wake any waiter. The agent may still finish the work; its
    /// late reply is discarded because the state is already terminal.
    pub async fn cancel_workflow(&self, request_id: &str) -> Result<ModuleState, CoordError> {
        let current = self.dbos.get_module_state(request_id).await?;
        if current.is_terminal() {
            return Err(CoordError::Conflict(format!(
                "workflow {request_id} already {}",
                current.state
            )));
        }
        if current.state == ModuleStatus::Created {
            return Err(CoordError::Conflict(
                "workflow not yet dispatched, retry shortly".into(),
            ));
        }

        let state = ModuleState::new(
            request_id,
            &current.agent_id,
            &current.module_name,
            ModuleStatus::Failed,
            now_unix(),
        )
        .with_error("cancelled")
        .with_detail("cancelled", "true");
        let stored = self.dbos.set_module_state(state).await?;

        self.rendezvous.complete(request_id, Outcome::Cancelled);
        self.log_event(
            EventLogEntry::new(EventKind::WorkflowFailed, "workflow cancelled", now_unix())
                .with_meta("request_id", request_id),
        )
        .await;
        self.metrics
            .workflows_completed
            .with_label_values(&["cancelled"])
            .inc();
        Ok(stored)
    }

    async fn prepare(&self, request: SubmitRequest) -> Result<Prepared, CoordError> {
        let spec = find_module(&request.module_name).ok_or_else(|| {
            self.metrics.rejected.with_label_values(&["unknown_module"]).inc();
            CoordError::Validation(format!("unknown module '{}'", request.module_name))
        })?;

        let agent = match self.dbos.get_agent(&request.agent_id).await {
            Ok(agent) => agent,
            Err(DbosError::NotFound(_)) => {
                return Err(CoordError::NotFound(format!("agent {}", request.agent_id)));
            }
            Err(e) => return Err(e.into()),
        };
        if !agent.is_alive(now_unix(), self.config.liveness_window_secs) {
            self.metrics.rejected.with_label_values(&["agent_dead"]).inc();
            return Err(CoordError::AgentUnavailable(request.agent_id));
        }

        let mut payload = request.payload;
        spec.schema.validate(&mut payload).map_err(|e| {
            self.metrics.rejected.with_label_values(&["validation"]).inc();
            CoordError::Validation(e.to_string())
        })?;

        let request_id = match request.request_id {
            None => uuid::Uuid::new_v4().to_string(),
            Some(request_id) => match self.dbos.get_module_state(&request_id).await {
                Err(DbosError::NotFound(_)) => request_id,
                Err(e) => return Err(e.into()),
                Ok(state) if !state.is_terminal() => {
                    return Ok(Prepared::Done(SubmitOutcome::Pending { request_id, state }));
                }
                Ok(state) if state.state == ModuleStatus::Completed => {
                    let result = self.dbos.get_result(&request.agent_id, &request_id).await?;
                    let value = serde_json::from_slice(&result.data).unwrap_or(Value::Null);
                    return Ok(Prepared::Done(SubmitOutcome::Completed {
                        request_id,
                        result: value,
                    }));
                }
                Ok(state) => {
                    return Ok(Prepared::Done(SubmitOutcome::Failed { request_id, state }));
                }
            },
        };

        Ok(Prepared::Fresh {
            request_id,
            spec,
            agent_id: request.agent_id,
            payload,
        })
    }

    fn acquire_slot(&self, agent_id: &str) -> Result<SlotGuard, CoordError> {
        let mut inflight = self.inflight.lock().unwrap();
        let count = inflight.entry(agent_id.to_string()).or_insert(0);
        if *count >= self.config.max_awaits_per_agent {
            self.metrics.rejected.with_label_values(&["busy"]).inc();
            return Err(CoordError::Busy(agent_id.to_string()));
        }
        *count += 1;
        Ok(SlotGuard {
            inflight: self.inflight.clone(),
            agent_id: agent_id.to_string(),
        })
    }

    async fn execute(
        &self,
        request_id: &str,
        spec: &'static ModuleSpec,
        agent_id: &str,
        mut payload: Value,
    ) -> Result<SubmitOutcome, CoordError> {
        let now = now_unix();

        // Persist start. A conflict here means a concurrent submit owns the
        // same request id (I3), which surfaces as 409.
        self.dbos
            .set_module_state(ModuleState::new(
                request_id,
                agent_id,
                spec.name,
                ModuleStatus::Created,
                now,
            ))
            .await?;
        self.dbos
            .set_module_state(ModuleState::new(
                request_id,
                agent_id,
                spec.name,
                ModuleStatus::Started,
                now,
            ))
            .await?;

        // Register the waiter before dispatch so the reply cannot slip past.
        let rx = self
            .rendezvous
            .register(request_id)
            .ok_or_else(|| CoordError::Conflict(format!("request {request_id} already awaited")))?;
        self.metrics.workflows_started.inc();

        if let Some(obj) = payload.as_object_mut() {
            obj.insert("id".to_string(), Value::String(request_id.to_string()));
        }
        let subjects = subject::for_module(spec.style, agent_id, spec.name);
        let mut headers = HeaderMap::new();
        let trace_id = trace::ensure(&mut headers);
        debug!(%request_id, subject = %subjects.input, %trace_id, "dispatching request");

        let bytes =
            serde_json::to_vec(&payload).map_err(|e| CoordError::Internal(e.to_string()))?;
        self.bus
            .publish(Message::new(subjects.input, bytes).with_headers(headers))
            .await?;

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(Outcome::Success(reply))) => {
                self.persist_success(agent_id, spec.name, request_id, &reply)
                    .await?;
                Ok(SubmitOutcome::Completed {
                    request_id: request_id.to_string(),
                    result: reply,
                })
            }
            Ok(Ok(Outcome::Error(reply))) => {
                self.persist_error(agent_id, spec.name, request_id, &reply)
                    .await?;
                Ok(SubmitOutcome::HandlerError {
                    request_id: request_id.to_string(),
                    error: reply,
                })
            }
            Ok(Ok(Outcome::Cancelled)) => Ok(SubmitOutcome::Cancelled {
                request_id: request_id.to_string(),
            }),
            Ok(Err(_)) => {
                self.rendezvous.remove(request_id);
                Err(CoordError::Internal("rendezvous sender dropped".into()))
            }
            Err(_) => {
                self.rendezvous.remove(request_id);
                self.fail_timeout(agent_id, spec.name, request_id).await;
                Err(CoordError::Timeout(self.config.request_timeout.as_millis()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence helpers (shared by waiters and orphan ingest)
    // ------------------------------------------------------------------

    async fn persist_success(
        &self,
        agent_id: &str,
        module_name: &str,
        request_id: &str,
        reply: &Value,
    ) -> Result<(), CoordError> {
        let now = now_unix();
        let data =
            serde_json::to_vec(reply).map_err(|e| CoordError::Internal(e.to_string()))?;
        let mut result = MeasurementResult::new(request_id, agent_id, module_name, data, now);
        result.server_id = self.server_id.clone();
        result.source = "bus".to_string();
        self.dbos.store_result(result).await?;

        let state = ModuleState::new(
            request_id,
            agent_id,
            module_name,
            ModuleStatus::Completed,
            now,
        );
        match self.dbos.set_module_state(state).await {
            Ok(_) => {}
            // A cancel or recovery sweep reached terminal first; the result
            // is stored either way.
            Err(DbosError::InvalidTransition(_)) => {
                debug!(%request_id, "completed write raced a terminal state");
            }
            Err(e) => return Err(e.into()),
        }
        self.metrics
            .workflows_completed
            .with_label_values(&["completed"])
            .inc();
        Ok(())
    }

    async fn persist_error(
        &self,
        agent_id: &str,
        module_name: &str,
        request_id: &str,
        reply: &ErrorReply,
    ) -> Result<(), CoordError> {
        // An unhandled handler crash is flagged by the agent; it maps to
        // `failed` rather than `error`.
        let crashed = reply
            .details
            .as_ref()
            .and_then(|d| d.get("crash"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let (status, kind, label) = if crashed {
            (ModuleStatus::Failed, EventKind::HandlerCrash, "failed")
        } else {
            (ModuleStatus::Error, EventKind::HandlerError, "error")
        };

        let state = ModuleState::new(request_id, agent_id, module_name, status, now_unix())
            .with_error(reply.error.clone());
        match self.dbos.set_module_state(state).await {
            Ok(_) | Err(DbosError::InvalidTransition(_)) => {}
            Err(e) => return Err(e.into()),
        }

        self.log_event(
            EventLogEntry::new(kind, reply.error.clone(), now_unix())
                .with_meta("request_id", request_id)
                .with_meta("agent_id", agent_id),
        )
        .await;
        self.metrics
            .workflows_completed
            .with_label_values(&[label])
            .inc();
        Ok(())
    }

    async fn fail_timeout(&self, agent_id: &str, module_name: &str, request_id: &str) {
        let state = ModuleState::new(
            request_id,
            agent_id,
            module_name,
            ModuleStatus::Failed,
            now_unix(),
        )
        .with_error("request timed out");
        match self.dbos.set_module_state(state).await {
            Ok(_) | Err(DbosError::InvalidTransition(_)) => {}
            Err(e) => warn!(%request_id, error = %e, "failed to persist timeout"),
        }

        self.log_event(
            EventLogEntry::new(EventKind::Timeout, "request timed out", now_unix())
                .with_meta("request_id", request_id)
                .with_meta("agent_id", agent_id),
        )
        .await;
        self.metrics
            .workflows_completed
            .with_label_values(&["timeout"])
            .inc();
    }

    async fn log_event(&self, entry: EventLogEntry) {
        if let Err(e) = self.dbos.log_event(entry).await {
            warn!(error = %e, "failed to append event");
        }
    }

    // ------------------------------------------------------------------
    // Bus consumers
    // ------------------------------------------------------------------

    async fn on_reply(&self, msg: Message) {
        let Some((agent_id, _module, kind)) = subject::parse_reply(&msg.subject) else {
            return;
        };

        match kind {
            ReplyKind::Out => {
                let Ok(payload) = serde_json::from_slice::<Value>(&msg.payload) else {
                    warn!(subject = %msg.subject, "undecodable reply payload");
                    return;
                };
                let request_id = payload
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if request_id.is_empty() {
                    debug!(subject = %msg.subject, "untracked reply without id");
                    return;
                }

                if !self
                    .rendezvous
                    .complete(&request_id, Outcome::Success(payload.clone()))
                {
                    self.ingest_orphan_result(&agent_id, &request_id, payload)
                        .await;
                }
            }
            ReplyKind::Error => {
                let reply = serde_json::from_slice::<ErrorReply>(&msg.payload).unwrap_or_else(
                    |_| ErrorReply {
                        id: String::new(),
                        error: String::from_utf8_lossy(&msg.payload).to_string(),
                        details: None,
                    },
                );
                if reply.id.is_empty() {
                    debug!(subject = %msg.subject, error = %reply.error, "untracked error reply");
                    return;
                }

                let request_id = reply.id.clone();
                if !self.rendezvous.complete(&request_id, Outcome::Error(reply.clone())) {
                    self.ingest_orphan_error(&request_id, reply).await;
                }
            }
        }
    }

    /// A reply with no waiter: either this coordinator restarted, or the
    /// reply is a duplicate/late delivery. Persist it when the workflow is
    /// still open, drop it when already terminal.
    async fn ingest_orphan_result(&self, agent_id: &str, request_id: &str, payload: Value) {
        match self.dbos.get_module_state(request_id).await {
            Ok(state) if state.is_terminal() => {
                debug!(%request_id, state = %state.state, "discarding late reply");
            }
            Ok(state) => {
                if let Err(e) = self
                    .persist_success(agent_id, &state.module_name, request_id, &payload)
                    .await
                {
                    warn!(%request_id, error = %e, "failed to ingest orphan result");
                }
            }
            Err(DbosError::NotFound(_)) => {
                debug!(%request_id, "reply for unknown workflow discarded");
            }
            Err(e) => warn!(%request_id, error = %e, "orphan result lookup failed"),
        }
    }

    async fn ingest_orphan_error(&self, request_id: &str, reply: ErrorReply) {
        match self.dbos.get_module_state(request_id).await {
            Ok(state) if state.is_terminal() => {
                debug!(%request_id, "discarding late error reply");
            }
            Ok(state) => {
                if let Err(e) = self
                    .persist_error(&state.agent_id, &state.module_name, request_id, &reply)
                    .await
                {
                    warn!(%request_id, error = %e, "failed to ingest orphan error");
                }
            }
            Err(DbosError::NotFound(_)) => {
                debug!(%request_id, "error reply for unknown workflow discarded");
            }
            Err(e) => warn!(%request_id, error = %e, "orphan error lookup failed"),
        }
    }

    /// Persist non-terminal state broadcasts (`running`). Terminal writes
    /// belong to the reply path, which persists the result first; accepting
    /// them here would create completed workflows without results.
    async fn on_state(&self, msg: Message) {
        let Ok(broadcast) = serde_json::from_slice::<StateBroadcast>(&msg.payload) else {
            warn!("undecodable state broadcast");
            return;
        };
        if broadcast.state.is_terminal() || broadcast.request_id.is_empty() {
            return;
        }

        let mut state = ModuleState::new(
            &broadcast.request_id,
            &broadcast.agent_id,
            &broadcast.module_name,
            broadcast.state,
            broadcast.timestamp,
        );
        state.error_message = broadcast.error_message;
        state.details = broadcast.details;

        match self.dbos.set_module_state(state).await {
            Ok(_) => {}
            // Duplicate broadcast or a transition that already happened.
            Err(DbosError::InvalidTransition(_)) | Err(DbosError::VersionConflict(_)) => {}
            Err(e) => warn!(request_id = %broadcast.request_id, error = %e, "failed to persist state broadcast"),
        }
    }

    /// Upsert the agent registry from a heartbeat, advancing `last_seen`
    /// and `total_heartbeats` monotonically (P4).
    async fn on_heartbeat(&self, msg: Message) {
        let Ok(hb) = serde_json::from_slice::<Heartbeat>(&msg.payload) else {
            warn!(subject = %msg.subject, "undecodable heartbeat");
            return;
        };

        let seen_at = hb.timestamp as i64;
        let agent = match self.dbos.get_agent(&hb.agent_id).await {
            Ok(mut existing) => {
                existing.hostname = hb.hostname;
                existing.alive = true;
                existing.last_seen = existing.last_seen.max(seen_at);
                existing.total_heartbeats = existing.total_heartbeats.max(hb.total_heartbeats);
                existing.config = hb.config;
                existing
            }
            Err(DbosError::NotFound(_)) => {
                info!(agent_id = %hb.agent_id, hostname = %hb.hostname, "new agent registered");
                self.log_event(
                    EventLogEntry::new(EventKind::AgentRegistered, "agent registered", now_unix())
                        .with_meta("agent_id", &hb.agent_id),
                )
                .await;
                Agent {
                    id: hb.agent_id,
                    hostname: hb.hostname,
                    alive: true,
                    first_seen: hb.first_seen as i64,
                    last_seen: seen_at,
                    config: hb.config,
                    total_heartbeats: hb.total_heartbeats,
                }
            }
            Err(e) => {
                warn!(error = %e, "heartbeat registry lookup failed");
                return;
            }
        };

        if let Err(e) = self.dbos.register_agent(agent).await {
            warn!(error = %e, "failed to register agent");
            return;
        }
        self.metrics.heartbeats.inc();
    }

    // ------------------------------------------------------------------
    // Restart recovery
    // ------------------------------------------------------------------

    /// Fail workflows orphaned past the recovery window and make expired
    /// in-flight tasks claimable again.
    pub async fn recover(&self) -> Result<(), CoordError> {
        let now = now_unix();
        let mut failed = 0usize;

        for state in self.dbos.list_all_module_states().await? {
            let stale = matches!(state.state, ModuleStatus::Started | ModuleStatus::Running)
                && now - state.timestamp > self.config.recovery_window_secs;
            if !stale {
                continue;
            }

            let next = ModuleState::new(
                &state.request_id,
                &state.agent_id,
                &state.module_name,
                ModuleStatus::Failed,
                now,
            )
            .with_error("orphaned by coordinator restart");
            match self.dbos.set_module_state(next).await {
                Ok(_) => {
                    failed += 1;
                    self.log_event(
                        EventLogEntry::new(EventKind::Recovery, "stale workflow failed", now)
                            .with_meta("request_id", &state.request_id),
                    )
                    .await;
                }
                Err(DbosError::InvalidTransition(_)) | Err(DbosError::VersionConflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let requeued = self.dbos.requeue_expired_tasks(now).await?;
        info!(failed, requeued, "recovery sweep finished");
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum ConsumerKind {
    Reply,
    State,
    Heartbeat,
}
