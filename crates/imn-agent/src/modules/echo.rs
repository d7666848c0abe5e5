use async_trait::async_trait;
use imn_bus::HeaderMap;
use imn_model::{ModuleSpec, find_module, now_unix_f64};
use serde_json::{Value, json};

use crate::{Module, ModuleError};

/// Echo back the message field.
///
/// Registered twice, as `echo_module` and `working_module`; both exist in
/// the field and differ only by name.
pub struct EchoModule {
    spec: &'static ModuleSpec,
}

impl EchoModule {
    pub fn new(name: &str) -> Option<Self> {
        find_module(name).map(|spec| Self { spec })
    }
}

#[async_trait]
impl Module for EchoModule {
    fn spec(&self) -> &'static ModuleSpec {
        self.spec
    }

    async fn handle(&self, request: Value, _headers: HeaderMap) -> Result<Value, ModuleError> {
        let message = request["message"]
            .as_str()
            .ok_or_else(|| ModuleError::new("missing 'message'"))?;

        Ok(json!({
            "message": message,
            "from_module": self.spec.name,
            "processed_at": now_unix_f64(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_message() {
        let module = EchoModule::new("echo_module").unwrap();
        let reply = module
            .handle(json!({"message": "hi"}), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(reply["message"], "hi");
        assert_eq!(reply["from_module"], "echo_module");
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(EchoModule::new("nope").is_none());
    }
}
