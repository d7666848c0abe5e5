//! Subject grammar.
//!
//! ```text
//! agent.{agent_id}.in|out|error            command / reply per agent
//! agent.{agent_id}.{module}.in|out|error   per-module variants
//! agent.heartbeat_module                   heartbeat broadcast
//! agent.module.state                       module-state broadcast
//! heartbeat.{agent_id}                     legacy per-agent heartbeat
//! ```

use imn_model::SubjectStyle;

/// Heartbeat broadcast subject; all agents publish here.
pub const HEARTBEAT: &str = "agent.heartbeat_module";

/// Module-state transition broadcast subject.
pub const MODULE_STATE: &str = "agent.module.state";

/// Input, output and error subjects of one module on one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    pub input: String,
    pub output: String,
    pub error: String,
}

/// Subjects for a module given its subject style.
pub fn for_module(style: SubjectStyle, agent_id: &str, module_name: &str) -> Subjects {
    match style {
        SubjectStyle::Agent => Subjects {
            input: format!("agent.{agent_id}.in"),
            output: format!("agent.{agent_id}.out"),
            error: format!("agent.{agent_id}.error"),
        },
        SubjectStyle::PerModule => Subjects {
            input: format!("agent.{agent_id}.{module_name}.in"),
            output: format!("agent.{agent_id}.{module_name}.out"),
            error: format!("agent.{agent_id}.{module_name}.error"),
        },
    }
}

/// Legacy per-agent heartbeat subject. Consumed, never published.
pub fn legacy_heartbeat(agent_id: &str) -> String {
    format!("heartbeat.{agent_id}")
}

/// Wildcard over all legacy heartbeat subjects.
pub const LEGACY_HEARTBEAT_WILDCARD: &str = "heartbeat.*";

/// Whether a reply subject is a success or an error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Out,
    Error,
}

/// Parse a reply subject into `(agent_id, module_name, kind)`.
///
/// Accepts both grammars: `agent.{id}.out|error` (no module) and
/// `agent.{id}.{module}.out|error`. Anything else, including the fixed
/// broadcast subjects, returns `None`.
pub fn parse_reply(subject: &str) -> Option<(String, Option<String>, ReplyKind)> {
    let tokens: Vec<&str> = subject.split('.').collect();
    if tokens.first() != Some(&"agent") {
        return None;
    }

    let kind = match *tokens.last()? {
        "out" => ReplyKind::Out,
        "error" => ReplyKind::Error,
        _ => return None,
    };

    match tokens.len() {
        3 => Some((tokens[1].to_string(), None, kind)),
        4 => Some((tokens[1].to_string(), Some(tokens[2].to_string()), kind)),
        _ => None,
    }
}

/// Match a subject against a pattern where `*` matches exactly one token.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_subjects() {
        let subjects = for_module(SubjectStyle::Agent, "a1", "ping_module");
        assert_eq!(subjects.input, "agent.a1.in");
        assert_eq!(subjects.output, "agent.a1.out");
        assert_eq!(subjects.error, "agent.a1.error");
    }

    #[test]
    fn per_module_subjects() {
        let subjects = for_module(SubjectStyle::PerModule, "a1", "echo_module");
        assert_eq!(subjects.input, "agent.a1.echo_module.in");
        assert_eq!(subjects.output, "agent.a1.echo_module.out");
        assert_eq!(subjects.error, "agent.a1.echo_module.error");
    }

    #[test]
    fn wildcard_matches_one_token() {
        assert!(matches("agent.*.out", "agent.a1.out"));
        assert!(matches("agent.*.*.out", "agent.a1.echo_module.out"));
        assert!(matches("heartbeat.*", "heartbeat.a1"));

        assert!(!matches("agent.*.out", "agent.a1.echo_module.out"));
        assert!(!matches("agent.*.out", "agent.a1.in"));
        assert!(!matches("agent.*.*.out", "agent.a1.out"));
    }

    #[test]
    fn exact_match() {
        assert!(matches(HEARTBEAT, HEARTBEAT));
        assert!(!matches(HEARTBEAT, MODULE_STATE));
    }

    #[test]
    fn parse_reply_subjects() {
        assert_eq!(
            parse_reply("agent.a1.out"),
            Some(("a1".to_string(), None, ReplyKind::Out))
        );
        assert_eq!(
            parse_reply("agent.a1.echo_module.error"),
            Some((
                "a1".to_string(),
                Some("echo_module".to_string()),
                ReplyKind::Error
            ))
        );

        assert_eq!(parse_reply("agent.a1.in"), None);
        assert_eq!(parse_reply(MODULE_STATE), None);
        assert_eq!(parse_reply(HEARTBEAT), None);
        assert_eq!(parse_reply("heartbeat.a1"), None);
    }
}
