use serde::{Deserialize, Serialize};

use crate::ConfigMap;

/// Lifecycle state of a measurement workflow.
///
/// The graph is strict: `created → started → running`, and from `started`
/// or `running` into one of the three terminal sinks. A skip from `started`
/// straight to a terminal state is legal because the `running` broadcast
/// travels over an at-least-once bus and may be lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Workflow record minted, nothing dispatched yet.
    Created,
    /// Request dispatched to the agent.
    Started,
    /// Agent acknowledged and is executing the module handler.
    Running,
    /// Handler returned a payload; a result exists.
    Completed,
    /// Handler returned an error payload.
    Error,
    /// Timeout, cancellation, or unhandled handler crash.
    Failed,
}

impl ModuleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModuleStatus::Completed | ModuleStatus::Error | ModuleStatus::Failed
        )
    }

    /// Transition legality per the workflow state machine.
    ///
    /// Terminal states are sinks; no transition (including self-transitions)
    /// leaves them.
    pub fn can_transition_to(&self, next: ModuleStatus) -> bool {
        use ModuleStatus::*;
        match self {
            Created => matches!(next, Started),
            Started => matches!(next, Running | Completed | Error | Failed),
            Running => matches!(next, Completed | Error | Failed),
            Completed | Error | Failed => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Created => "created",
            ModuleStatus::Started => "started",
            ModuleStatus::Running => "running",
            ModuleStatus::Completed => "completed",
            ModuleStatus::Error => "error",
            ModuleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<ModuleStatus> {
        match s {
            "created" => Some(ModuleStatus::Created),
            "started" => Some(ModuleStatus::Started),
            "running" => Some(ModuleStatus::Running),
            "completed" => Some(ModuleStatus::Completed),
            "error" => Some(ModuleStatus::Error),
            "failed" => Some(ModuleStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one workflow, keyed by `request_id`.
///
/// `version` starts at 1 on the first write and increments on every legal
/// transition; the store assigns it, callers leave it at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub request_id: String,
    pub agent_id: String,
    pub module_name: String,
    pub state: ModuleStatus,
    /// Empty unless `state` is `error` or `failed`.
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub details: ConfigMap,
    /// Unix seconds of the transition.
    pub timestamp: i64,
    #[serde(default)]
    pub version: i64,
}

impl ModuleState {
    pub fn new(
        request_id: impl Into<String>,
        agent_id: impl Into<String>,
        module_name: impl Into<String>,
        state: ModuleStatus,
        now: i64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            agent_id: agent_id.into(),
            module_name: module_name.into(),
            state,
            error_message: String::new(),
            details: ConfigMap::new(),
            timestamp: now,
            version: 0,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModuleStatus::*;

    const ALL: [ModuleStatus; 6] = [Created, Started, Running, Completed, Error, Failed];

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [Completed, Error, Failed] {
            for next in ALL {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be illegal"
                );
            }
        }
    }

    #[test]
    fn happy_path_is_legal() {
        assert!(Created.can_transition_to(Started));
        assert!(Started.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
    }

    #[test]
    fn started_may_skip_running() {
        assert!(Started.can_transition_to(Completed));
        assert!(Started.can_transition_to(Error));
        assert!(Started.can_transition_to(Failed));
    }

    #[test]
    fn created_only_moves_to_started() {
        for next in ALL {
            let legal = Created.can_transition_to(next);
            assert_eq!(legal, next == Started, "created -> {next}");
        }
    }

    #[test]
    fn no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{state} -> {state}");
        }
    }

    #[test]
    fn reachability_is_transitive_along_versions() {
        // Any chain of legal transitions keeps terminal states last: once a
        // state is terminal nothing follows, so a higher version can never
        // hold an earlier lifecycle phase.
        fn reachable(from: ModuleStatus, to: ModuleStatus) -> bool {
            if from.can_transition_to(to) {
                return true;
            }
            ALL.iter()
                .filter(|mid| from.can_transition_to(**mid))
                .any(|mid| reachable(*mid, to))
        }
        assert!(reachable(Created, Completed));
        assert!(reachable(Created, Failed));
        assert!(!reachable(Completed, Running));
        assert!(!reachable(Failed, Created));
    }

    #[test]
    fn status_parse_roundtrip() {
        for state in ALL {
            assert_eq!(ModuleStatus::parse(state.as_str()), Some(state));
        }
        assert_eq!(ModuleStatus::parse("bogus"), None);
    }

    #[test]
    fn state_serde_roundtrip() {
        let state = ModuleState::new("w1", "a1", "ping_module", Running, 100)
            .with_detail("source", "rest");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""state":"running""#));
        let back: ModuleState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
