//! Agent runtime.
//!
//! An agent hosts the built-in measurement modules: each one gets a worker
//! that consumes its input subject serially, validates against the module
//! schema, runs the handler under a duration guard and publishes the reply
//! and state broadcasts. A crash inside one handler never takes down the
//! agent or its other modules.

mod error;
pub use error::{AgentError, ModuleError};

mod config;
pub use config::AgentConfig;

mod module;
pub use module::Module;

pub mod modules;

mod registry;
pub use registry::builtin_modules;

mod worker;
pub use worker::ModuleWorker;

mod heartbeat;
pub use heartbeat::HeartbeatEmitter;

mod runtime;
pub use runtime::{AgentHandle, AgentRuntime};
