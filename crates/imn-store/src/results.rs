use std::sync::Arc;
use std::time::Duration;

use imn_kv::{Batch, KvEngine};
use imn_model::MeasurementResult;

use crate::{StoreError, keys};

/// Measurement result store with idempotent writes.
///
/// The primary record, the per-agent index entry and the idempotency mark
/// are written in one atomic batch, so a duplicate `.out` delivery (the bus
/// is at-least-once) can never produce a second index entry (P2) and a
/// stored result is always observable through `get` (P5).
#[derive(Clone)]
pub struct ResultStore {
    engine: Arc<dyn KvEngine>,
    idempotency_ttl: Duration,
}

impl ResultStore {
    pub fn new(engine: Arc<dyn KvEngine>, idempotency_ttl: Duration) -> Self {
        Self {
            engine,
            idempotency_ttl,
        }
    }

    /// Store a result. Returns `false` when the idempotency mark was
    /// already present and nothing was written.
    pub async fn store(&self, result: &MeasurementResult) -> Result<bool, StoreError> {
        let mark = keys::processed(&result.id);
        if self.engine.exists(&mark).await? {
            tracing::debug!(request_id = %result.id, "duplicate result suppressed");
            return Ok(false);
        }

        let key = keys::result(&result.agent_id, &result.id);
        let batch = Batch::new()
            .set(key.clone(), serde_json::to_vec(result)?)
            .zadd(keys::result_index(&result.agent_id), key, result.received_at)
            .set_ttl(mark, b"1".to_vec(), self.idempotency_ttl);
        self.engine.apply(batch).await?;
        Ok(true)
    }

    pub async fn get(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<MeasurementResult, StoreError> {
        let bytes = self
            .engine
            .get(&keys::result(agent_id, request_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("result {agent_id}/{request_id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All results for an agent, oldest ingest first.
    pub async fn list(&self, agent_id: &str) -> Result<Vec<MeasurementResult>, StoreError> {
        let members = self.engine.zmembers(&keys::result_index(agent_id)).await?;
        let mut results = Vec::with_capacity(members.len());
        for member in members {
            if let Some(bytes) = self.engine.get(&member.member).await? {
                match serde_json::from_slice(&bytes) {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        tracing::warn!(key = %member.member, error = %e, "skipping undecodable result")
                    }
                }
            }
        }
        Ok(results)
    }

    /// Delete a result together with its index entry and idempotency mark,
    /// so the same request id may be re-ingested. Returns whether the
    /// record existed.
    pub async fn delete(&self, agent_id: &str, request_id: &str) -> Result<bool, StoreError> {
        let key = keys::result(agent_id, request_id);
        let existed = self.engine.exists(&key).await?;

        let batch = Batch::new()
            .delete(key.clone())
            .zrem(keys::result_index(agent_id), key)
            .delete(keys::processed(request_id));
        self.engine.apply(batch).await?;
        Ok(existed)
    }

    /// Whether the idempotency mark for a request id is currently set.
    pub async fn has_mark(&self, request_id: &str) -> Result<bool, StoreError> {
        Ok(self.engine.exists(&keys::processed(request_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imn_kv::{KvEngine, MemoryEngine};

    const TTL: Duration = Duration::from_secs(86_400);

    fn setup() -> (Arc<MemoryEngine>, ResultStore) {
        let engine = Arc::new(MemoryEngine::new());
        let results = ResultStore::new(engine.clone(), TTL);
        (engine, results)
    }

    fn result(id: &str) -> MeasurementResult {
        MeasurementResult::new(id, "a1", "ping_module", b"{\"rtts\":[]}".to_vec(), 100)
    }

    #[tokio::test]
    async fn stored_result_is_readable() {
        let (_, results) = setup();
        assert!(results.store(&result("w1")).await.unwrap());

        let got = results.get("a1", "w1").await.unwrap();
        assert_eq!(got, result("w1"));
        assert!(results.has_mark("w1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_store_is_a_noop() {
        let (engine, results) = setup();
        assert!(results.store(&result("w2")).await.unwrap());
        assert!(!results.store(&result("w2")).await.unwrap());
        assert!(!results.store(&result("w2")).await.unwrap());

        let members = engine.zmembers(&keys::result_index("a1")).await.unwrap();
        assert_eq!(members.len(), 1, "exactly one index entry");
        assert_eq!(results.list("a1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_, results) = setup();
        let err = results.get("a1", "ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_clears_mark_and_index() {
        let (engine, results) = setup();
        results.store(&result("w3")).await.unwrap();

        assert!(results.delete("a1", "w3").await.unwrap());
        assert!(!results.has_mark("w3").await.unwrap());
        assert!(engine.zmembers(&keys::result_index("a1")).await.unwrap().is_empty());

        // The same id may now be ingested again.
        assert!(results.store(&result("w3")).await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_reports_absent() {
        let (_, results) = setup();
        assert!(!results.delete("a1", "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn list_orders_by_ingest_time() {
        let (_, results) = setup();
        let mut early = result("w-early");
        early.received_at = 10;
        let mut late = result("w-late");
        late.received_at = 20;

        results.store(&late).await.unwrap();
        results.store(&early).await.unwrap();

        let listed = results.list("a1").await.unwrap();
        assert_eq!(listed[0].id, "w-early");
        assert_eq!(listed[1].id, "w-late");
    }
}
