use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use imn_bus::{Bus, Message, subject};
use imn_model::wire::Heartbeat;
use imn_model::{ConfigMap, now_unix_f64};

/// Periodic heartbeat publisher.
///
/// Publishes on `agent.heartbeat_module` every interval with a monotonic
/// counter; the coordinator rebuilds the agent registry from these. The
/// config map rides along so operators can see what a remote agent runs.
pub struct HeartbeatEmitter {
    agent_id: String,
    hostname: String,
    bus: Arc<dyn Bus>,
    interval: Duration,
    config: ConfigMap,
    first_seen: f64,
    counter: AtomicI64,
    cancel: CancellationToken,
}

impl HeartbeatEmitter {
    pub fn new(
        agent_id: impl Into<String>,
        hostname: impl Into<String>,
        bus: Arc<dyn Bus>,
        interval: Duration,
        config: ConfigMap,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            hostname: hostname.into(),
            bus,
            interval,
            config,
            first_seen: now_unix_f64(),
            counter: AtomicI64::new(0),
            cancel,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.beat().await,
            }
        }
    }

    async fn beat(&self) {
        let total = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let heartbeat = Heartbeat {
            agent_id: self.agent_id.clone(),
            hostname: self.hostname.clone(),
            first_seen: self.first_seen,
            total_heartbeats: total,
            config: self.config.clone(),
            timestamp: now_unix_f64(),
        };

        let bytes = match serde_json::to_vec(&heartbeat) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "unencodable heartbeat");
                return;
            }
        };
        if let Err(e) = self
            .bus
            .publish(Message::new(subject::HEARTBEAT, bytes))
            .await
        {
            warn!(error = %e, "failed to publish heartbeat");
            return;
        }
        debug!(agent_id = %self.agent_id, total, "heartbeat published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imn_bus::InProcBus;

    #[tokio::test]
    async fn counter_is_monotonic() {
        let bus = Arc::new(InProcBus::new());
        let mut sub = bus.subscribe(subject::HEARTBEAT).await.unwrap();

        let emitter = HeartbeatEmitter::new(
            "a1",
            "host-a",
            bus.clone(),
            Duration::from_millis(10),
            ConfigMap::new(),
            CancellationToken::new(),
        );
        tokio::spawn(emitter.run());

        let first: Heartbeat =
            serde_json::from_slice(&sub.next().await.unwrap().payload).unwrap();
        let second: Heartbeat =
            serde_json::from_slice(&sub.next().await.unwrap().payload).unwrap();

        assert_eq!(first.agent_id, "a1");
        assert!(second.total_heartbeats > first.total_heartbeats);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(second.first_seen, first.first_seen);
    }
}
