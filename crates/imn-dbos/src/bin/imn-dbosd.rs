use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use imn_dbos::{DbosGrpcService, DbosServiceServer};
use imn_kv::MemoryEngine;
use imn_observe::{LoggerConfig, logger_init};
use imn_store::{Store, StoreConfig};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1) Logger
    logger_init(&LoggerConfig::from_env())?;

    // 2) Engine: KV_ADDR is the journal path of the embedded engine.
    let journal_path = env_or("KV_ADDR", "./data/imn-kv.journal");
    let engine = Arc::new(MemoryEngine::open(&journal_path)?);
    info!(path = %journal_path, "kv engine ready");

    // 3) Store
    let store_config = StoreConfig {
        idempotency_ttl: Duration::from_secs(env_u64("IDEMPOTENCY_TTL_S", 86_400)),
        max_task_retries: env_u64("MAX_TASK_RETRIES", 5) as i32,
        requeue_jitter: Duration::from_secs(env_u64("REQUEUE_JITTER_S", 5)),
    };
    let store = Store::new(engine, store_config);

    // 4) Serve
    let addr: SocketAddr = env_or("DBOS_LISTEN", "0.0.0.0:50051").parse()?;
    let service = DbosGrpcService::new(store);
    info!(%addr, "dbos listening");

    tonic::transport::Server::builder()
        .add_service(DbosServiceServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
