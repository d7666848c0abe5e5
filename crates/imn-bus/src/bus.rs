use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{BusError, Message};

/// Boundary contract to the pub/sub broker.
///
/// Publish suspends until the broker accepted the message. Delivery is
/// at-least-once; per subscription, messages are consumed one at a time so
/// handler code is never re-entered concurrently.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    async fn publish(&self, msg: Message) -> Result<(), BusError>;

    /// Subscribe to a subject pattern (`*` matches one token).
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError>;
}

/// One active subscription.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) detaches it from
/// the bus; messages still queued are discarded.
pub struct Subscription {
    pattern: String,
    rx: mpsc::Receiver<Message>,
    closer: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new(
        pattern: impl Into<String>,
        rx: mpsc::Receiver<Message>,
        closer: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            rx,
            closer: Some(closer),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next message, or `None` once the bus side is gone.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}
