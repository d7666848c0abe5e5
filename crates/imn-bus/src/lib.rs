//! Subject routing over the message bus.
//!
//! [`Bus`] is the boundary contract to the broker; [`InProcBus`] is the
//! in-process implementation used by embedded deployments and tests. The
//! subject grammar lives in [`subject`] and is the only place subjects are
//! spelled out.

mod error;
pub use error::BusError;

pub mod subject;

mod message;
pub use message::{HeaderMap, Message};

pub mod trace;

mod bus;
pub use bus::{Bus, Subscription};

mod memory;
pub use memory::InProcBus;
