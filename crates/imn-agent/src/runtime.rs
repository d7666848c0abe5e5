use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use imn_bus::{Bus, subject};
use imn_model::ConfigMap;

use crate::{AgentConfig, AgentError, HeartbeatEmitter, Module, ModuleWorker, builtin_modules};

/// The agent process: one worker per module plus the heartbeat emitter.
pub struct AgentRuntime {
    config: AgentConfig,
    bus: Arc<dyn Bus>,
    modules: Vec<Arc<dyn Module>>,
}

impl AgentRuntime {
    /// Runtime with the built-in module set (filtered by the config).
    pub fn new(config: AgentConfig, bus: Arc<dyn Bus>) -> Self {
        let modules = builtin_modules(&config.modules);
        Self {
            config,
            bus,
            modules,
        }
    }

    /// Replace the module set; used by tests to inject misbehaving modules.
    pub fn with_modules(mut self, modules: Vec<Arc<dyn Module>>) -> Self {
        self.modules = modules;
        self
    }

    /// Run setup for every module, then spawn the workers and the heartbeat
    /// emitter. Fails fast when any module refuses to set up.
    pub async fn start(self) -> Result<AgentHandle, AgentError> {
        if self.modules.is_empty() {
            return Err(AgentError::Config("no modules to run".into()));
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let mut config = ConfigMap::new();
        config.insert("agent_version".into(), env!("CARGO_PKG_VERSION").into());

        for module in &self.modules {
            let spec = module.spec();
            module.setup().await.map_err(|e| AgentError::Setup {
                module: spec.name.to_string(),
                message: e.to_string(),
            })?;

            let subjects = subject::for_module(spec.style, &self.config.agent_id, spec.name);
            config.insert(format!("module.{}", spec.name), subjects.input.clone());

            let worker = ModuleWorker::new(
                self.config.agent_id.clone(),
                module.clone(),
                self.bus.clone(),
                self.config.handler_timeout,
                cancel.clone(),
            );
            tasks.push(worker.start().await?);
        }

        let emitter = HeartbeatEmitter::new(
            self.config.agent_id.clone(),
            self.config.hostname.clone(),
            self.bus.clone(),
            self.config.heartbeat_interval,
            config,
            cancel.clone(),
        );
        tasks.push(tokio::spawn(emitter.run()));

        info!(
            agent_id = %self.config.agent_id,
            modules = self.modules.len(),
            "agent runtime started"
        );
        Ok(AgentHandle { cancel, tasks })
    }
}

/// Handle to a started runtime.
#[derive(Debug)]
pub struct AgentHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every worker and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Wait until the runtime is cancelled from elsewhere.
    pub async fn wait(self) {
        self.cancel.cancelled().await;
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
