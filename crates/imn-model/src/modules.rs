//! Built-in module registry.
//!
//! Modules are compiled in and addressed by name; the table below is the
//! single source of truth for names, input schemas and subject style, used
//! by the coordinator for admission and by the agent runtime for dispatch.

use std::sync::OnceLock;

use serde_json::json;

use crate::schema::{FieldKind, FieldSpec, InputSchema};

/// How a module's bus subjects are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectStyle {
    /// `agent.{agent_id}.in|out|error` — shared per-agent subjects.
    Agent,
    /// `agent.{agent_id}.{module}.in|out|error` — private per-module subjects.
    PerModule,
}

/// Static description of one built-in module.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub name: &'static str,
    pub style: SubjectStyle,
    pub schema: InputSchema,
    /// Handler guard override in milliseconds; the runtime default applies
    /// when absent.
    pub handler_timeout_ms: Option<u64>,
}

static REGISTRY: OnceLock<Vec<ModuleSpec>> = OnceLock::new();

/// All built-in module specs.
pub fn builtin_specs() -> &'static [ModuleSpec] {
    REGISTRY.get_or_init(|| {
        vec![
            ModuleSpec {
                name: "ping_module",
                style: SubjectStyle::Agent,
                schema: InputSchema::new(vec![
                    FieldSpec::required("host", FieldKind::Str).with_synonyms(&["target"]),
                    FieldSpec::optional("count", FieldKind::Int)
                        .with_default(json!(3))
                        .with_min(1),
                    FieldSpec::optional("port", FieldKind::Int)
                        .with_default(json!(80))
                        .with_min(1),
                ]),
                handler_timeout_ms: None,
            },
            ModuleSpec {
                name: "tcping",
                style: SubjectStyle::PerModule,
                schema: InputSchema::new(vec![
                    FieldSpec::required("host", FieldKind::Str),
                    FieldSpec::optional("port", FieldKind::Int)
                        .with_default(json!(80))
                        .with_min(1),
                    FieldSpec::optional("count", FieldKind::Int)
                        .with_default(json!(3))
                        .with_min(1),
                ]),
                handler_timeout_ms: None,
            },
            ModuleSpec {
                name: "echo_module",
                style: SubjectStyle::PerModule,
                schema: InputSchema::new(vec![FieldSpec::required("message", FieldKind::Str)]),
                handler_timeout_ms: None,
            },
            ModuleSpec {
                name: "working_module",
                style: SubjectStyle::PerModule,
                schema: InputSchema::new(vec![FieldSpec::required("message", FieldKind::Str)]),
                handler_timeout_ms: None,
            },
            ModuleSpec {
                name: "faulty_module",
                style: SubjectStyle::PerModule,
                schema: InputSchema::new(vec![
                    FieldSpec::required("message", FieldKind::Str),
                    FieldSpec::optional("delay", FieldKind::Int).with_min(0),
                    FieldSpec::optional("crash", FieldKind::Bool),
                ]),
                handler_timeout_ms: None,
            },
        ]
    })
}

/// Look up a built-in module spec by name.
pub fn find_module(name: &str) -> Option<&'static ModuleSpec> {
    builtin_specs().iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_contains_all_builtins() {
        let names: Vec<_> = builtin_specs().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "ping_module",
                "tcping",
                "echo_module",
                "working_module",
                "faulty_module"
            ]
        );
    }

    #[test]
    fn find_module_by_name() {
        assert!(find_module("ping_module").is_some());
        assert!(find_module("no_such_module").is_none());
    }

    #[test]
    fn ping_accepts_target_synonym() {
        let spec = find_module("ping_module").unwrap();
        let mut value = json!({"target": "1.1.1.1"});
        spec.schema.validate(&mut value).unwrap();
        assert_eq!(value["host"], "1.1.1.1");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn only_ping_uses_shared_subjects() {
        for spec in builtin_specs() {
            let expected = if spec.name == "ping_module" {
                SubjectStyle::Agent
            } else {
                SubjectStyle::PerModule
            };
            assert_eq!(spec.style, expected, "{}", spec.name);
        }
    }
}
