use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use imn_bus::HeaderMap;
use imn_model::{ModuleSpec, find_module, now_unix_f64};
use serde_json::{Value, json};

use crate::{Module, ModuleError};

/// Failure-injection module for exercising the error paths.
///
/// `delay` sleeps before replying, `crash` raises a handler error. Repeated
/// request ids are treated as replays and answered idempotently with a
/// `replayed` flag instead of being processed again.
pub struct FaultyModule {
    spec: &'static ModuleSpec,
    processed_ids: Mutex<HashSet<String>>,
}

impl FaultyModule {
    pub fn new() -> Self {
        Self {
            spec: find_module("faulty_module").expect("faulty_module is registered"),
            processed_ids: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for FaultyModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for FaultyModule {
    fn spec(&self) -> &'static ModuleSpec {
        self.spec
    }

    async fn handle(&self, request: Value, _headers: HeaderMap) -> Result<Value, ModuleError> {
        if let Some(delay) = request["delay"].as_i64() {
            tokio::time::sleep(Duration::from_secs(delay.max(0) as u64)).await;
        }

        if request["crash"].as_bool().unwrap_or(false) {
            return Err(ModuleError::new("intentional crash triggered"));
        }

        let replayed = match request["id"].as_str() {
            Some(id) => !self.processed_ids.lock().unwrap().insert(id.to_string()),
            None => false,
        };
        if replayed {
            tracing::warn!(id = %request["id"], "duplicate request replayed");
        }

        Ok(json!({
            "from_module": self.spec.name,
            "processed_at": now_unix_f64(),
            "input": request,
            "replayed": replayed,
        }))
    }
}
