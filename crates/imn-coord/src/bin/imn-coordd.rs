use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use imn_agent::{AgentConfig, AgentRuntime};
use imn_bus::{Bus, InProcBus};
use imn_coord::{CoordConfig, Coordinator, TaskPump, http};
use imn_dbos::{DbosApi, DbosClient, DirectDbos};
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

    // 2) State store: remote gRPC when DBOS_ADDRESS is set, embedded
    //    journal-backed store otherwise.
    let dbos: Arc<dyn DbosApi> = match std::env::var("DBOS_ADDRESS") {
        Ok(address) => {
            info!(%address, "connecting to dbos");
            Arc::new(DbosClient::connect(address).await?)
        }
        Err(_) => {
            let journal_path = env_or("KV_ADDR", "./data/imn-kv.journal");
            let engine = Arc::new(MemoryEngine::open(&journal_path)?);
            let store_config = StoreConfig {
                idempotency_ttl: Duration::from_secs(env_u64("IDEMPOTENCY_TTL_S", 86_400)),
                max_task_retries: env_u64("MAX_TASK_RETRIES", 5) as i32,
                requeue_jitter: Duration::from_secs(env_u64("REQUEUE_JITTER_S", 5)),
            };
            info!(path = %journal_path, "embedded dbos store ready");
            Arc::new(DirectDbos::new(Store::new(engine, store_config)))
        }
    };

    // 3) Bus. In-process; a broker-backed Bus implementation slots in here.
    let bus: Arc<dyn Bus> = Arc::new(InProcBus::new());

    // 4) Coordinator + consumers
    let coordinator = Coordinator::new(dbos, bus.clone(), CoordConfig::from_env())?;
    coordinator.start().await?;
    let cancel: CancellationToken = coordinator.cancel_token();

    // 5) Task pump
    let pump = TaskPump::new(coordinator.clone(), cancel.clone());
    tokio::spawn(pump.run());

    // 6) Embedded agents (comma-separated ids; empty disables them)
    let embedded = env_or("EMBED_AGENTS", "agent-1");
    let mut agent_handles = Vec::new();
    for agent_id in embedded.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let config = AgentConfig {
            agent_id: agent_id.to_string(),
            ..AgentConfig::from_env()
        };
        let handle = AgentRuntime::new(config, bus.clone()).start().await?;
        info!(%agent_id, "embedded agent running");
        agent_handles.push(handle);
    }

    // 7) HTTP surface
    let addr = env_or("HTTP_LISTEN", "0.0.0.0:8080");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "http listening");

    let app = http::router(coordinator);
    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown_cancel.cancelled() => {}
            }
        })
        .await?;

    // 8) Drain
    cancel.cancel();
    for handle in agent_handles {
        handle.shutdown().await;
    }
    info!("shutdown complete");
    Ok(())
}
