//! Control-plane coordinator.
//!
//! Accepts measurement requests, tracks each workflow through the module
//! state machine, dispatches over the bus, awaits the reply on a keyed
//! rendezvous, persists outcomes through the DBOS seam and fronts it all
//! with the REST surface.

mod error;
pub use error::CoordError;

mod config;
pub use config::CoordConfig;

mod rendezvous;
pub use rendezvous::{Outcome, Rendezvous};

mod metrics;
pub use metrics::Metrics;

mod coordinator;
pub use coordinator::{Coordinator, SubmitOutcome, SubmitRequest};

mod pump;
pub use pump::TaskPump;

pub mod http;
