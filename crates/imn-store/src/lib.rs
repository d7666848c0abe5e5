//! Durable state store (DBOS) for the measurement network.
//!
//! Each sub-store is a thin layer over [`imn_kv::KvEngine`] that owns one
//! slice of the key space. Multi-key updates are issued as atomic batches;
//! optimistic concurrency on module states rides on guarded batches.

mod error;
pub use error::StoreError;

pub mod keys;

mod agents;
pub use agents::AgentStore;

mod module_states;
pub use module_states::ModuleStateStore;

mod results;
pub use results::ResultStore;

mod tasks;
pub use tasks::TaskQueue;

mod events;
pub use events::EventLog;

mod store;
pub use store::{Store, StoreConfig};
