use async_trait::async_trait;
use imn_bus::HeaderMap;
use imn_model::{ModuleSpec, find_module, now_unix_f64};
use serde_json::{Value, json};

use crate::modules::probe::tcp_probe;
use crate::{Module, ModuleError};

/// Reachability probe with RTT statistics.
///
/// Listens on the shared per-agent subjects, so a bare request to
/// `agent.{id}.in` lands here.
pub struct PingModule {
    spec: &'static ModuleSpec,
}

impl PingModule {
    pub fn new() -> Self {
        Self {
            spec: find_module("ping_module").expect("ping_module is registered"),
        }
    }
}

impl Default for PingModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for PingModule {
    fn spec(&self) -> &'static ModuleSpec {
        self.spec
    }

    async fn handle(&self, request: Value, _headers: HeaderMap) -> Result<Value, ModuleError> {
        let host = request["host"]
            .as_str()
            .ok_or_else(|| ModuleError::new("missing 'host'"))?
            .to_string();
        let count = request["count"].as_i64().unwrap_or(3);
        let port = request["port"].as_i64().unwrap_or(80) as u16;

        tracing::debug!(%host, count, port, "starting ping probe");
        let stats = tcp_probe(&host, port, count).await;

        Ok(json!({
            "address": host,
            "port": port,
            "protocol": "TCP",
            "rtts": stats.rtts_ms,
            "packets_sent": stats.packets_sent,
            "packets_received": stats.packets_received,
            "packet_loss": stats.packet_loss(),
            "rtt_min": stats.rtt_min(),
            "rtt_avg": stats.rtt_avg(),
            "rtt_max": stats.rtt_max(),
            "jitter": stats.jitter(),
            "is_alive": stats.is_alive(),
            "timestamp": now_unix_f64(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_canonical_fields() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let module = PingModule::new();
        let request = json!({"host": "127.0.0.1", "count": 2, "port": port});
        let reply = module.handle(request, HeaderMap::new()).await.unwrap();

        assert_eq!(reply["address"], "127.0.0.1");
        assert_eq!(reply["packets_sent"], 2);
        assert_eq!(reply["packets_received"], 2);
        assert_eq!(reply["rtts"].as_array().unwrap().len(), 2);
        assert_eq!(reply["is_alive"], true);
    }

    #[tokio::test]
    async fn missing_host_is_a_handler_error() {
        let module = PingModule::new();
        let err = module
            .handle(json!({"count": 1}), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(err.message.contains("host"));
    }
}
