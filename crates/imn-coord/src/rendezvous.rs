use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use imn_model::wire::ErrorReply;

/// Terminal outcome delivered through the rendezvous.
#[derive(Debug)]
pub enum Outcome {
    /// Success payload from the module's out subject.
    Success(serde_json::Value),
    /// Handler-raised error from the error subject.
    Error(ErrorReply),
    /// The workflow was cancelled while awaited.
    Cancelled,
}

/// Keyed one-shot signal map for the coordinator's await step.
///
/// The submit path registers before dispatching; the bus consumers complete
/// when the matching reply arrives; the timeout path removes its entry.
/// Both sides clean up, so entries never outlive their request.
#[derive(Default)]
pub struct Rendezvous {
    waiters: Mutex<HashMap<String, oneshot::Sender<Outcome>>>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. `None` when the request id already has one, which
    /// means two workflows would share an id.
    pub fn register(&self, request_id: &str) -> Option<oneshot::Receiver<Outcome>> {
        let mut waiters = self.waiters.lock().unwrap();
        if waiters.contains_key(request_id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(request_id.to_string(), tx);
        Some(rx)
    }

    /// Fire the waiter for a request id. Returns `false` when nobody waits,
    /// in which case the caller owns the orphan handling.
    pub fn complete(&self, request_id: &str, outcome: Outcome) -> bool {
        let sender = self.waiters.lock().unwrap().remove(request_id);
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, request_id: &str) {
        self.waiters.lock().unwrap().remove(request_id);
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
