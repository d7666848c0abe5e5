use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use imn_bus::subject::{self, Subjects};
use imn_bus::{Bus, HeaderMap, Message, trace};
use imn_model::wire::{ErrorReply, StateBroadcast};
use imn_model::{ConfigMap, ModuleStatus, now_unix};

use crate::{AgentError, Module};

/// Worker loop for one module on one agent.
///
/// Consumes the module's input subject serially. For each message: decode,
/// validate, broadcast `running`, run the handler under the duration guard,
/// then publish the reply and the terminal state broadcast. A panicking
/// handler is contained here; the worker keeps serving.
pub struct ModuleWorker {
    agent_id: String,
    module: Arc<dyn Module>,
    bus: Arc<dyn Bus>,
    subjects: Subjects,
    handler_timeout: Duration,
    cancel: CancellationToken,
}

impl ModuleWorker {
    pub fn new(
        agent_id: impl Into<String>,
        module: Arc<dyn Module>,
        bus: Arc<dyn Bus>,
        default_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let agent_id = agent_id.into();
        let spec = module.spec();
        let subjects = subject::for_module(spec.style, &agent_id, spec.name);
        let handler_timeout = spec
            .handler_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);

        Self {
            agent_id,
            module,
            bus,
            subjects,
            handler_timeout,
            cancel,
        }
    }

    pub fn input_subject(&self) -> &str {
        &self.subjects.input
    }

    /// Subscribe to the input subject, then serve it from a spawned task.
    ///
    /// Subscribing happens before the spawn so that a request published
    /// right after `start` returns cannot be lost.
    pub async fn start(self) -> Result<tokio::task::JoinHandle<()>, AgentError> {
        let sub = self.bus.subscribe(&self.subjects.input).await?;
        debug!(module = self.module.spec().name, subject = %self.subjects.input, "worker listening");
        Ok(tokio::spawn(self.serve(sub)))
    }

    async fn serve(self, mut sub: imn_bus::Subscription) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                msg = sub.next() => match msg {
                    Some(msg) => self.process(msg).await,
                    None => return,
                },
            }
        }
    }

    async fn process(&self, msg: Message) {
        let module_name = self.module.spec().name;

        let mut value: Value = match serde_json::from_slice(&msg.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(module = module_name, error = %e, "undecodable request");
                self.publish_error(&msg.headers, "", format!("invalid JSON: {e}"), None)
                    .await;
                return;
            }
        };

        let request_id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Err(e) = self.module.spec().schema.validate(&mut value) {
            warn!(module = module_name, request_id = %request_id, error = %e, "request failed validation");
            self.publish_error(&msg.headers, &request_id, e.to_string(), None)
                .await;
            self.broadcast(&msg.headers, &request_id, ModuleStatus::Error, e.to_string())
                .await;
            return;
        }

        self.broadcast(&msg.headers, &request_id, ModuleStatus::Running, String::new())
            .await;

        // The handler runs in its own task so a panic is contained as a
        // join error instead of unwinding through the worker loop.
        let module = self.module.clone();
        let request = value.clone();
        let headers = msg.headers.clone();
        let mut join = tokio::spawn(async move { module.handle(request, headers).await });

        let outcome = tokio::select! {
            result = &mut join => Some(result),
            _ = tokio::time::sleep(self.handler_timeout) => {
                join.abort();
                None
            }
        };

        match outcome {
            Some(Ok(Ok(mut payload))) => {
                if let Some(obj) = payload.as_object_mut()
                    && !request_id.is_empty()
                {
                    obj.insert("id".to_string(), Value::String(request_id.clone()));
                }
                self.publish_out(&msg.headers, &payload).await;
                self.broadcast(&msg.headers, &request_id, ModuleStatus::Completed, String::new())
                    .await;
            }
            Some(Ok(Err(module_err))) => {
                debug!(module = module_name, request_id = %request_id, error = %module_err, "handler error");
                self.publish_error(
                    &msg.headers,
                    &request_id,
                    module_err.message.clone(),
                    module_err.details.clone(),
                )
                .await;
                self.broadcast(&msg.headers, &request_id, ModuleStatus::Error, module_err.message)
                    .await;
            }
            Some(Err(join_err)) => {
                error!(module = module_name, request_id = %request_id, error = %join_err, "handler crashed");
                let message = format!("module crashed: {join_err}");
                // The crash marker tells the coordinator to persist `failed`
                // rather than `error` for this reply.
                self.publish_error(
                    &msg.headers,
                    &request_id,
                    message.clone(),
                    Some(serde_json::json!({"crash": true})),
                )
                .await;
                self.broadcast(&msg.headers, &request_id, ModuleStatus::Failed, message)
                    .await;
            }
            None => {
                warn!(module = module_name, request_id = %request_id, "handler timed out");
                let message = format!(
                    "handler exceeded {}ms guard",
                    self.handler_timeout.as_millis()
                );
                self.publish_error(&msg.headers, &request_id, message.clone(), None)
                    .await;
                self.broadcast(&msg.headers, &request_id, ModuleStatus::Error, message)
                    .await;
            }
        }
    }

    async fn publish_out(&self, incoming: &HeaderMap, payload: &Value) {
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "unencodable reply payload");
                return;
            }
        };
        let msg = Message::new(self.subjects.output.clone(), bytes)
            .with_headers(self.propagated(incoming));
        if let Err(e) = self.bus.publish(msg).await {
            warn!(error = %e, subject = %self.subjects.output, "failed to publish reply");
        }
    }

    async fn publish_error(
        &self,
        incoming: &HeaderMap,
        request_id: &str,
        message: String,
        details: Option<Value>,
    ) {
        let reply = ErrorReply {
            id: request_id.to_string(),
            error: message,
            details,
        };
        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "unencodable error payload");
                return;
            }
        };
        let msg = Message::new(self.subjects.error.clone(), bytes)
            .with_headers(self.propagated(incoming));
        if let Err(e) = self.bus.publish(msg).await {
            warn!(error = %e, subject = %self.subjects.error, "failed to publish error");
        }
    }

    /// Broadcast a state transition. Skipped for untracked requests (no id)
    /// since there is no workflow to report on.
    async fn broadcast(
        &self,
        incoming: &HeaderMap,
        request_id: &str,
        state: ModuleStatus,
        error_message: String,
    ) {
        if request_id.is_empty() {
            return;
        }

        let broadcast = StateBroadcast {
            agent_id: self.agent_id.clone(),
            module_name: self.module.spec().name.to_string(),
            state,
            request_id: request_id.to_string(),
            timestamp: now_unix(),
            version: 0,
            error_message,
            details: ConfigMap::new(),
        };
        let bytes = match serde_json::to_vec(&broadcast) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "unencodable state broadcast");
                return;
            }
        };
        let msg =
            Message::new(subject::MODULE_STATE, bytes).with_headers(self.propagated(incoming));
        if let Err(e) = self.bus.publish(msg).await {
            warn!(error = %e, "failed to publish state broadcast");
        }
    }

    fn propagated(&self, incoming: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        trace::propagate(incoming, &mut headers);
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imn_bus::InProcBus;
    use imn_model::find_module;
    use serde_json::json;

    use crate::ModuleError;
    use crate::modules::{EchoModule, FaultyModule};

    struct PanickingModule;

    #[async_trait]
    impl Module for PanickingModule {
        fn spec(&self) -> &'static imn_model::ModuleSpec {
            find_module("working_module").unwrap()
        }

        async fn handle(&self, _request: Value, _headers: HeaderMap) -> Result<Value, ModuleError> {
            panic!("boom");
        }
    }

    struct Harness {
        bus: Arc<InProcBus>,
        input: String,
        out: imn_bus::Subscription,
        err: imn_bus::Subscription,
        states: imn_bus::Subscription,
    }

    async fn start(module: Arc<dyn Module>, timeout: Duration) -> Harness {
        let bus = Arc::new(InProcBus::new());
        let worker = ModuleWorker::new(
            "a1",
            module,
            bus.clone(),
            timeout,
            CancellationToken::new(),
        );
        let input = worker.input_subject().to_string();
        let subjects = subject::for_module(
            worker.module.spec().style,
            "a1",
            worker.module.spec().name,
        );

        let out = bus.subscribe(&subjects.output).await.unwrap();
        let err = bus.subscribe(&subjects.error).await.unwrap();
        let states = bus.subscribe(subject::MODULE_STATE).await.unwrap();
        worker.start().await.unwrap();

        Harness {
            bus,
            input,
            out,
            err,
            states,
        }
    }

    fn decode(msg: &Message) -> Value {
        serde_json::from_slice(&msg.payload).unwrap()
    }

    async fn next_state(harness: &mut Harness) -> StateBroadcast {
        let msg = harness.states.next().await.unwrap();
        serde_json::from_slice(&msg.payload).unwrap()
    }

    #[tokio::test]
    async fn echo_roundtrip_with_state_broadcasts() {
        let module = Arc::new(EchoModule::new("echo_module").unwrap());
        let mut harness = start(module, Duration::from_secs(5)).await;

        let request = json!({"id": "w1", "message": "hi"});
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&request).unwrap(),
            ))
            .await
            .unwrap();

        let reply = decode(&harness.out.next().await.unwrap());
        assert_eq!(reply["id"], "w1");
        assert_eq!(reply["message"], "hi");

        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Running);
        let done = next_state(&mut harness).await;
        assert_eq!(done.state, ModuleStatus::Completed);
        assert_eq!(done.request_id, "w1");
    }

    #[tokio::test]
    async fn validation_failure_goes_to_error_subject() {
        let module = Arc::new(EchoModule::new("echo_module").unwrap());
        let mut harness = start(module, Duration::from_secs(5)).await;

        let request = json!({"id": "w2"});
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&request).unwrap(),
            ))
            .await
            .unwrap();

        let reply = decode(&harness.err.next().await.unwrap());
        assert_eq!(reply["id"], "w2");
        assert!(reply["error"].as_str().unwrap().contains("message"));

        let state = next_state(&mut harness).await;
        assert_eq!(state.state, ModuleStatus::Error);
    }

    #[tokio::test]
    async fn handler_error_keeps_worker_alive() {
        let module = Arc::new(FaultyModule::new());
        let mut harness = start(module, Duration::from_secs(5)).await;

        let crash = json!({"id": "w3", "message": "x", "crash": true});
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&crash).unwrap(),
            ))
            .await
            .unwrap();

        let reply = decode(&harness.err.next().await.unwrap());
        assert!(reply["error"].as_str().unwrap().contains("crash"));
        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Running);
        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Error);

        // The worker must keep serving after the handler error.
        let ok = json!({"id": "w4", "message": "x"});
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&ok).unwrap(),
            ))
            .await
            .unwrap();
        let reply = decode(&harness.out.next().await.unwrap());
        assert_eq!(reply["id"], "w4");
    }

    #[tokio::test]
    async fn panic_is_isolated_and_maps_to_failed() {
        let mut harness = start(Arc::new(PanickingModule), Duration::from_secs(5)).await;

        let request = json!({"id": "w5", "message": "x"});
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&request).unwrap(),
            ))
            .await
            .unwrap();

        let reply = decode(&harness.err.next().await.unwrap());
        assert!(reply["error"].as_str().unwrap().contains("crashed"));
        assert_eq!(reply["details"]["crash"], true);
        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Running);
        let state = next_state(&mut harness).await;
        assert_eq!(state.state, ModuleStatus::Failed);

        // Another message is still processed.
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&json!({"id": "w6", "message": "x"})).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Running);
    }

    #[tokio::test]
    async fn slow_handler_hits_the_guard() {
        let module = Arc::new(FaultyModule::new());
        let mut harness = start(module, Duration::from_millis(100)).await;

        let request = json!({"id": "w7", "message": "x", "delay": 30});
        harness
            .bus
            .publish(Message::new(
                harness.input.clone(),
                serde_json::to_vec(&request).unwrap(),
            ))
            .await
            .unwrap();

        let reply = decode(&harness.err.next().await.unwrap());
        assert!(reply["error"].as_str().unwrap().contains("guard"));
        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Running);
        assert_eq!(next_state(&mut harness).await.state, ModuleStatus::Error);
    }

    #[tokio::test]
    async fn trace_id_is_propagated_to_replies() {
        let module = Arc::new(EchoModule::new("echo_module").unwrap());
        let mut harness = start(module, Duration::from_secs(5)).await;

        let mut headers = HeaderMap::new();
        let trace_id = trace::ensure(&mut headers);
        harness
            .bus
            .publish(
                Message::new(
                    harness.input.clone(),
                    serde_json::to_vec(&json!({"id": "w8", "message": "x"})).unwrap(),
                )
                .with_headers(headers),
            )
            .await
            .unwrap();

        let reply = harness.out.next().await.unwrap();
        assert_eq!(trace::extract(&reply.headers), Some(trace_id.as_str()));
    }
}
