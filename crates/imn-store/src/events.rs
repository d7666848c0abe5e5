use std::sync::Arc;

use imn_kv::KvEngine;
use imn_model::EventLogEntry;

use crate::{StoreError, keys};

/// Append-only event log, read newest-first.
#[derive(Clone)]
pub struct EventLog {
    engine: Arc<dyn KvEngine>,
}

impl EventLog {
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self { engine }
    }

    pub async fn log(&self, entry: &EventLogEntry) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(entry)?;
        self.engine.lpush(keys::EVENTS_LOG, &bytes).await?;
        Ok(())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<EventLogEntry>, StoreError> {
        let entries = self.engine.lrange(keys::EVENTS_LOG, limit).await?;
        let mut events = Vec::with_capacity(entries.len());
        for bytes in entries {
            match serde_json::from_slice(&bytes) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable event"),
            }
        }
        Ok(events)
    }
}
