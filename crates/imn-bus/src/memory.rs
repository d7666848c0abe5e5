use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::bus::{Bus, Subscription};
use crate::{BusError, Message, subject};

/// Per-subscription queue depth. Publishing suspends when a consumer lags
/// this far behind, which is the backpressure the broker would apply.
const SUBSCRIPTION_DEPTH: usize = 1024;

struct SubEntry {
    id: u64,
    pattern: String,
    tx: mpsc::Sender<Message>,
}

type Registry = Arc<Mutex<Vec<SubEntry>>>;

/// In-process bus.
///
/// Fan-out matches each published subject against every subscription
/// pattern; each subscription gets its own queue, consumed serially by its
/// owner. Used by embedded single-process deployments and the test suite; a
/// broker-backed implementation plugs in behind the same [`Bus`] trait.
#[derive(Clone)]
pub struct InProcBus {
    subs: Registry,
    next_id: Arc<AtomicU64>,
}

impl InProcBus {
    pub fn new() -> Self {
        Self {
            subs: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for InProcBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InProcBus {
    async fn publish(&self, msg: Message) -> Result<(), BusError> {
        let targets: Vec<(u64, mpsc::Sender<Message>)> = {
            let subs = self.subs.lock().unwrap();
            subs.iter()
                .filter(|entry| subject::matches(&entry.pattern, &msg.subject))
                .map(|entry| (entry.id, entry.tx.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.send(msg.clone()).await.is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subs.lock().unwrap();
            subs.retain(|entry| !dead.contains(&entry.id));
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        if pattern.is_empty() {
            return Err(BusError::InvalidSubject(pattern.to_string()));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs.lock().unwrap().push(SubEntry {
            id,
            pattern: pattern.to_string(),
            tx,
        });

        let registry = self.subs.clone();
        let closer = Box::new(move || {
            registry.lock().unwrap().retain(|entry| entry.id != id);
        });
        Ok(Subscription::new(pattern, rx, closer))
    }
}
