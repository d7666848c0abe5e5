use async_trait::async_trait;
use imn_bus::HeaderMap;
use imn_model::{ModuleSpec, find_module, now_unix_f64};
use serde_json::{Value, json};

use crate::modules::probe::tcp_probe;
use crate::{Module, ModuleError};

/// Explicit TCP connectivity check on its own per-module subjects.
pub struct TcpingModule {
    spec: &'static ModuleSpec,
}

impl TcpingModule {
    pub fn new() -> Self {
        Self {
            spec: find_module("tcping").expect("tcping is registered"),
        }
    }
}

impl Default for TcpingModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for TcpingModule {
    fn spec(&self) -> &'static ModuleSpec {
        self.spec
    }

    async fn handle(&self, request: Value, _headers: HeaderMap) -> Result<Value, ModuleError> {
        let host = request["host"]
            .as_str()
            .ok_or_else(|| ModuleError::new("missing 'host'"))?
            .to_string();
        let port = request["port"].as_i64().unwrap_or(80) as u16;
        let count = request["count"].as_i64().unwrap_or(3);

        let stats = tcp_probe(&host, port, count).await;

        Ok(json!({
            "address": host,
            "port": port,
            "protocol": "TCP",
            "rtts": stats.rtts_ms,
            "packets_sent": stats.packets_sent,
            "packets_received": stats.packets_received,
            "packet_loss": stats.packet_loss(),
            "is_alive": stats.is_alive(),
            "timestamp": now_unix_f64(),
        }))
    }
}
