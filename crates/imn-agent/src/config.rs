use std::time::Duration;

/// Agent boot configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Stable agent identifier; generated when `AGENT_ID` is unset.
    pub agent_id: String,
    pub hostname: String,
    /// Heartbeat cadence (`HEARTBEAT_INTERVAL_MS`, default 2000).
    pub heartbeat_interval: Duration,
    /// Handler duration guard (`HANDLER_TIMEOUT_MS`, default 30000).
    pub handler_timeout: Duration,
    /// Module names to run; empty means every built-in (`MODULES`,
    /// comma-separated).
    pub modules: Vec<String>,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let agent_id = std::env::var("AGENT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let modules = std::env::var("MODULES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            agent_id,
            hostname,
            heartbeat_interval: Duration::from_millis(env_u64("HEARTBEAT_INTERVAL_MS", 2_000)),
            handler_timeout: Duration::from_millis(env_u64("HANDLER_TIMEOUT_MS", 30_000)),
            modules,
        }
    }

    /// Fixed-id config for embedded agents and tests.
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            heartbeat_interval: Duration::from_millis(2_000),
            handler_timeout: Duration::from_millis(30_000),
            modules: Vec::new(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
