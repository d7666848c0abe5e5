//! Domain model shared by every IMN component: records, the module state
//! machine, declarative input schemas and bus wire payloads.

mod domain;
pub use domain::*;

pub mod schema;
pub use schema::{FieldKind, FieldSpec, InputSchema, SchemaError};

mod modules;
pub use modules::{ModuleSpec, SubjectStyle, builtin_specs, find_module};

pub mod wire;

mod time;
pub use time::{now_unix, now_unix_f64};
