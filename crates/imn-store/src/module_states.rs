use std::sync::Arc;

use imn_kv::{Batch, KvEngine, KvError};
use imn_model::ModuleState;

use crate::{StoreError, keys};

/// How many times a plain `set` re-reads and retries when another writer
/// slips in between read and guarded write.
const SET_RETRIES: usize = 3;

/// Versioned module-state store.
///
/// The transition table lives in [`imn_model::ModuleStatus`], right next to
/// this write path; nothing else in the system is allowed to decide
/// legality. Writes are guarded batches on the current record bytes, which
/// serializes concurrent writers (O1).
#[derive(Clone)]
pub struct ModuleStateStore {
    engine: Arc<dyn KvEngine>,
}

impl ModuleStateStore {
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self { engine }
    }

    /// Persist a transition, assigning the next version.
    ///
    /// On an illegal transition the call fails and the stored record is
    /// untouched. Lost races against concurrent writers are retried with a
    /// fresh read a few times before surfacing as a version conflict.
    pub async fn set(&self, state: &ModuleState) -> Result<ModuleState, StoreError> {
        for _ in 0..SET_RETRIES {
            let current = self.read_raw(&state.request_id).await?;
            match self.write_guarded(state, current.as_ref(), None).await {
                Err(StoreError::Kv(KvError::VersionConflict(_))) => continue,
                other => return other,
            }
        }
        Err(StoreError::VersionConflict {
            request_id: state.request_id.clone(),
        })
    }

    /// Persist a transition only if the stored version equals `expected`.
    ///
    /// Never retried: a mismatch means the caller's read is stale and it
    /// must re-read before deciding anything.
    pub async fn set_with_version(
        &self,
        state: &ModuleState,
        expected: i64,
    ) -> Result<ModuleState, StoreError> {
        let current = self.read_raw(&state.request_id).await?;
        let conflict = || StoreError::VersionConflict {
            request_id: state.request_id.clone(),
        };

        match &current {
            Some((_, cur)) if cur.version != expected => return Err(conflict()),
            None if expected != 0 => return Err(conflict()),
            _ => {}
        }

        self.write_guarded(state, current.as_ref(), Some(expected))
            .await
            .map_err(|e| match e {
                StoreError::Kv(KvError::VersionConflict(_)) => conflict(),
                other => other,
            })
    }

    pub async fn get(&self, request_id: &str) -> Result<ModuleState, StoreError> {
        let (_, state) = self
            .read_raw(request_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("module state {request_id}")))?;
        Ok(state)
    }

    /// States for one agent and module, oldest first.
    pub async fn list(&self, agent_id: &str, module_name: &str) -> Result<Vec<ModuleState>, StoreError> {
        let index = keys::module_state_index(agent_id, module_name);
        let members = self.engine.zmembers(&index).await?;

        let mut states = Vec::with_capacity(members.len());
        for member in members {
            match self.engine.get(&member.member).await? {
                Some(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(state) => states.push(state),
                    Err(e) => {
                        tracing::warn!(key = %member.member, error = %e, "skipping undecodable module state")
                    }
                },
                None => {}
            }
        }
        Ok(states)
    }

    /// Every stored module state, for health summaries and restart recovery.
    pub async fn list_all(&self) -> Result<Vec<ModuleState>, StoreError> {
        let entries = self.engine.scan_prefix(keys::MODULE_STATE_PREFIX).await?;
        let mut states = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match serde_json::from_slice(&bytes) {
                Ok(state) => states.push(state),
                Err(e) => tracing::warn!(%key, error = %e, "skipping undecodable module state"),
            }
        }
        Ok(states)
    }

    async fn read_raw(
        &self,
        request_id: &str,
    ) -> Result<Option<(Vec<u8>, ModuleState)>, StoreError> {
        match self.engine.get(&keys::module_state(request_id)).await? {
            Some(bytes) => {
                let state: ModuleState = serde_json::from_slice(&bytes)?;
                Ok(Some((bytes, state)))
            }
            None => Ok(None),
        }
    }

    /// Validate the transition against `current`, then write the record and
    /// upsert the secondary index in one guarded batch.
    async fn write_guarded(
        &self,
        state: &ModuleState,
        current: Option<&(Vec<u8>, ModuleState)>,
        expected_version: Option<i64>,
    ) -> Result<ModuleState, StoreError> {
        let mut next = state.clone();
        let guard_bytes = match current {
            Some((bytes, cur)) => {
                if !cur.state.can_transition_to(next.state) {
                    return Err(StoreError::InvalidTransition {
                        from: cur.state,
                        to: next.state,
                    });
                }
                next.version = match expected_version {
                    Some(v) => v + 1,
                    None => cur.version + 1,
                };
                Some(bytes.clone())
            }
            None => {
                next.version = 1;
                None
            }
        };

        let key = keys::module_state(&next.request_id);
        let index = keys::module_state_index(&next.agent_id, &next.module_name);
        let batch = Batch::guarded(key.clone(), guard_bytes)
            .set(key.clone(), serde_json::to_vec(&next)?)
            .zadd(index, key, next.timestamp);
        self.engine.apply(batch).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imn_kv::MemoryEngine;
    use imn_model::ModuleStatus;

    fn store() -> ModuleStateStore {
        ModuleStateStore::new(Arc::new(MemoryEngine::new()))
    }

    fn state(status: ModuleStatus) -> ModuleState {
        ModuleState::new("w1", "a1", "echo_module", status, 100)
    }

    #[tokio::test]
    async fn first_write_gets_version_one() {
        let states = store();
        let stored = states.set(&state(ModuleStatus::Created)).await.unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn versions_increment_along_the_chain() {
        let states = store();
        states.set(&state(ModuleStatus::Created)).await.unwrap();
        states.set(&state(ModuleStatus::Started)).await.unwrap();
        states.set(&state(ModuleStatus::Running)).await.unwrap();
        let done = states.set(&state(ModuleStatus::Completed)).await.unwrap();

        assert_eq!(done.version, 4);
        assert_eq!(states.get("w1").await.unwrap().state, ModuleStatus::Completed);
    }

    #[tokio::test]
    async fn illegal_transition_leaves_record_untouched() {
        let states = store();
        states.set(&state(ModuleStatus::Created)).await.unwrap();
        states.set(&state(ModuleStatus::Started)).await.unwrap();
        states.set(&state(ModuleStatus::Completed)).await.unwrap();

        let err = states.set(&state(ModuleStatus::Running)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ModuleStatus::Completed,
                to: ModuleStatus::Running
            }
        ));

        let stored = states.get("w1").await.unwrap();
        assert_eq!(stored.state, ModuleStatus::Completed);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let states = store();
        states.set(&state(ModuleStatus::Created)).await.unwrap();
        states.set(&state(ModuleStatus::Started)).await.unwrap();

        let err = states
            .set_with_version(&state(ModuleStatus::Running), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let stored = states.get("w1").await.unwrap();
        assert_eq!(stored.state, ModuleStatus::Started);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn matching_version_is_accepted() {
        let states = store();
        states.set(&state(ModuleStatus::Created)).await.unwrap();

        let stored = states
            .set_with_version(&state(ModuleStatus::Started), 1)
            .await
            .unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.state, ModuleStatus::Started);
    }

    #[tokio::test]
    async fn list_by_agent_and_module() {
        let states = store();
        states.set(&state(ModuleStatus::Created)).await.unwrap();
        let other = ModuleState::new("w2", "a1", "echo_module", ModuleStatus::Created, 200);
        states.set(&other).await.unwrap();

        let listed = states.list("a1", "echo_module").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(states.list("a1", "ping_module").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_versions_stay_reachable() {
        // Persisted history of one request id is a legal walk of the graph:
        // sort any two snapshots by version and the later state must be
        // reachable from the earlier one.
        let states = store();
        let chain = [
            ModuleStatus::Created,
            ModuleStatus::Started,
            ModuleStatus::Running,
            ModuleStatus::Error,
        ];
        let mut snapshots = Vec::new();
        for status in chain {
            snapshots.push(states.set(&state(status)).await.unwrap());
        }

        for earlier in &snapshots {
            for later in &snapshots {
                if later.version > earlier.version {
                    let mut reachable = earlier.state.can_transition_to(later.state);
                    for mid in [ModuleStatus::Started, ModuleStatus::Running] {
                        reachable = reachable
                            || (earlier.state.can_transition_to(mid)
                                && (mid == later.state || mid.can_transition_to(later.state)));
                    }
                    assert!(reachable, "{} v{} -> {} v{}", earlier.state, earlier.version, later.state, later.version);
                }
            }
        }
    }
}
