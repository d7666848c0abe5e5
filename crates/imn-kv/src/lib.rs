//! Capability layer over the backing key-value engine.
//!
//! The [`KvEngine`] trait is the boundary contract: plain keys, i64-scored
//! sorted sets, newest-first lists, prefix scans and an atomic conditional
//! batch write. [`MemoryEngine`] is the in-memory-primary implementation
//! with optional on-disk durability through an append-only journal.

mod error;
pub use error::KvError;

mod engine;
pub use engine::{Batch, Guard, KvEngine, ScoredMember, WriteOp};

mod memory;
pub use memory::MemoryEngine;

mod journal;
