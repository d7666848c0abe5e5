use std::time::Duration;

use imn_model::DEFAULT_LIVENESS_WINDOW_SECS;

/// Coordinator configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct CoordConfig {
    /// Per-request await deadline (`REQUEST_TIMEOUT_MS`, default 30000).
    pub request_timeout: Duration,
    /// Alive/dead threshold in seconds (`LIVENESS_WINDOW_MS`, default 10000).
    pub liveness_window_secs: i64,
    /// Outstanding-await ceiling per agent (`MAX_AWAITS_PER_AGENT`,
    /// default 64); requests above it are rejected busy.
    pub max_awaits_per_agent: usize,
    /// Age beyond which non-terminal workflows are failed on restart
    /// (`RECOVERY_WINDOW_S`, default 60).
    pub recovery_window_secs: i64,
    /// Task in-flight deadline (`VISIBILITY_TIMEOUT_S`, default 300).
    pub visibility_timeout: Duration,
    /// Task pump poll cadence (`TASK_POLL_INTERVAL_MS`, default 5000).
    pub task_poll_interval: Duration,
    /// Delay before a nacked task becomes due again
    /// (`TASK_RETRY_DELAY_S`, default 30).
    pub task_retry_delay: Duration,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(30_000),
            liveness_window_secs: DEFAULT_LIVENESS_WINDOW_SECS,
            max_awaits_per_agent: 64,
            recovery_window_secs: 60,
            visibility_timeout: Duration::from_secs(300),
            task_poll_interval: Duration::from_millis(5_000),
            task_retry_delay: Duration::from_secs(30),
        }
    }
}

impl CoordConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout: Duration::from_millis(env_u64(
                "REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )),
            liveness_window_secs: (env_u64(
                "LIVENESS_WINDOW_MS",
                (defaults.liveness_window_secs * 1_000) as u64,
            ) / 1_000) as i64,
            max_awaits_per_agent: env_u64(
                "MAX_AWAITS_PER_AGENT",
                defaults.max_awaits_per_agent as u64,
            ) as usize,
            recovery_window_secs: env_u64(
                "RECOVERY_WINDOW_S",
                defaults.recovery_window_secs as u64,
            ) as i64,
            visibility_timeout: Duration::from_secs(env_u64(
                "VISIBILITY_TIMEOUT_S",
                defaults.visibility_timeout.as_secs(),
            )),
            task_poll_interval: Duration::from_millis(env_u64(
                "TASK_POLL_INTERVAL_MS",
                defaults.task_poll_interval.as_millis() as u64,
            )),
            task_retry_delay: Duration::from_secs(env_u64(
                "TASK_RETRY_DELAY_S",
                defaults.task_retry_delay.as_secs(),
            )),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
