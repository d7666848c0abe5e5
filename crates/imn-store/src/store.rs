use std::sync::Arc;
use std::time::Duration;

use imn_kv::KvEngine;

use crate::{AgentStore, EventLog, ModuleStateStore, ResultStore, TaskQueue};

/// Store tuning knobs, all environment-configurable at the binary level.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// TTL of the result idempotency mark.
    pub idempotency_ttl: Duration,
    /// Nack/requeue ceiling before a task is dead-lettered.
    pub max_task_retries: i32,
    /// Delay applied when the recovery sweep requeues an expired task.
    pub requeue_jitter: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::from_secs(86_400),
            max_task_retries: 5,
            requeue_jitter: Duration::from_secs(5),
        }
    }
}

/// All sub-stores over one shared engine.
#[derive(Clone)]
pub struct Store {
    pub agents: AgentStore,
    pub module_states: ModuleStateStore,
    pub results: ResultStore,
    pub tasks: TaskQueue,
    pub events: EventLog,
}

impl Store {
    pub fn new(engine: Arc<dyn KvEngine>, config: StoreConfig) -> Self {
        Self {
            agents: AgentStore::new(engine.clone()),
            module_states: ModuleStateStore::new(engine.clone()),
            results: ResultStore::new(engine.clone(), config.idempotency_ttl),
            tasks: TaskQueue::new(
                engine.clone(),
                config.max_task_retries,
                config.requeue_jitter,
            ),
            events: EventLog::new(engine),
        }
    }
}
