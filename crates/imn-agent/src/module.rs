use async_trait::async_trait;
use imn_bus::HeaderMap;
use imn_model::ModuleSpec;
use serde_json::Value;

use crate::ModuleError;

/// One pluggable measurement unit.
///
/// The spec carries the name, input schema and subject style; `handle` gets
/// a request that already passed schema validation (defaults applied,
/// synonyms renamed) and returns the success payload. The runtime adds the
/// duration guard, crash isolation and all publishing around it.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    fn spec(&self) -> &'static ModuleSpec;

    /// One-time initialization before the worker subscribes.
    async fn setup(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn handle(&self, request: Value, headers: HeaderMap) -> Result<Value, ModuleError>;
}
