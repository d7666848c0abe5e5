use std::sync::Arc;

use imn_kv::KvEngine;
use imn_model::Agent;

use crate::{StoreError, keys};

/// Agent registry, keyed by `agent:<id>`.
///
/// Registration is an unconditional overwrite: heartbeats are
/// last-writer-wins, and monotonicity of `last_seen` / `total_heartbeats`
/// is the consumer's job.
#[derive(Clone)]
pub struct AgentStore {
    engine: Arc<dyn KvEngine>,
}

impl AgentStore {
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self { engine }
    }

    pub async fn register(&self, agent: &Agent) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(agent)?;
        self.engine.set(&keys::agent(&agent.id), &bytes, None).await?;
        Ok(())
    }

    pub async fn get(&self, agent_id: &str) -> Result<Agent, StoreError> {
        let bytes = self
            .engine
            .get(&keys::agent(agent_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("agent {agent_id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn list(&self) -> Result<Vec<Agent>, StoreError> {
        let entries = self.engine.scan_prefix(keys::AGENT_PREFIX).await?;
        let mut agents = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match serde_json::from_slice(&bytes) {
                Ok(agent) => agents.push(agent),
                Err(e) => tracing::warn!(%key, error = %e, "skipping undecodable agent record"),
            }
        }
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imn_kv::MemoryEngine;

    fn store() -> AgentStore {
        AgentStore::new(Arc::new(MemoryEngine::new()))
    }

    #[tokio::test]
    async fn register_and_get() {
        let agents = store();
        let agent = Agent::new("a1", "host-a", 100);
        agents.register(&agent).await.unwrap();

        let got = agents.get("a1").await.unwrap();
        assert_eq!(got, agent);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let err = store().get("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn register_overwrites() {
        let agents = store();
        let mut agent = Agent::new("a1", "host-a", 100);
        agents.register(&agent).await.unwrap();

        agent.last_seen = 200;
        agent.total_heartbeats = 5;
        agents.register(&agent).await.unwrap();

        let got = agents.get("a1").await.unwrap();
        assert_eq!(got.last_seen, 200);
        assert_eq!(got.total_heartbeats, 5);
    }

    #[tokio::test]
    async fn list_returns_all() {
        let agents = store();
        agents.register(&Agent::new("a1", "h1", 1)).await.unwrap();
        agents.register(&Agent::new("a2", "h2", 2)).await.unwrap();

        let all = agents.list().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
