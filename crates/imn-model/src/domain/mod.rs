mod agent;
pub use agent::Agent;

mod module_state;
pub use module_state::{ModuleState, ModuleStatus};

mod result;
pub use result::MeasurementResult;

mod task;
pub use task::{Task, TaskStatus};

mod event;
pub use event::{EventKind, EventLogEntry};

/// String-to-string mapping used for agent configuration, state details and
/// event metadata. A `BTreeMap` keeps serialization deterministic.
pub type ConfigMap = std::collections::BTreeMap<String, String>;

/// Default liveness window: an agent is alive if it heartbeated within this
/// many seconds.
pub const DEFAULT_LIVENESS_WINDOW_SECS: i64 = 10;
