use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Coordinator metrics, exposed in Prometheus text format on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub workflows_started: IntCounter,
    pub workflows_completed: IntCounterVec,
    pub heartbeats: IntCounter,
    pub rejected: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let workflows_started = IntCounter::new(
            "imn_workflows_started_total",
            "Workflows accepted and dispatched",
        )?;
        let workflows_completed = IntCounterVec::new(
            Opts::new(
                "imn_workflows_completed_total",
                "Workflows reaching a terminal state",
            ),
            &["outcome"],
        )?;
        let heartbeats = IntCounter::new("imn_heartbeats_total", "Heartbeats consumed")?;
        let rejected = IntCounterVec::new(
            Opts::new("imn_requests_rejected_total", "Requests rejected before dispatch"),
            &["reason"],
        )?;

        registry.register(Box::new(workflows_started.clone()))?;
        registry.register(Box::new(workflows_completed.clone()))?;
        registry.register(Box::new(heartbeats.clone()))?;
        registry.register(Box::new(rejected.clone()))?;

        Ok(Self {
            registry,
            workflows_started,
            workflows_completed,
            heartbeats,
            rejected,
        })
    }

    /// Render every registered metric in the exposition format.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
