//! Key space layout.
//!
//! Kept byte-compatible with the original deployment so an existing store
//! can be read back: primary records under typed prefixes, sorted-set
//! secondary indexes keyed by agent, and a handful of well-known set and
//! list names.

pub const TASKS_PENDING: &str = "tasks:pending";
pub const TASKS_INFLIGHT: &str = "tasks:inflight";
pub const TASKS_DEAD: &str = "tasks:dead";
pub const EVENTS_LOG: &str = "events:log";

pub const AGENT_PREFIX: &str = "agent:";
pub const MODULE_STATE_PREFIX: &str = "module_state:";

pub fn agent(agent_id: &str) -> String {
    format!("{AGENT_PREFIX}{agent_id}")
}

pub fn module_state(request_id: &str) -> String {
    format!("{MODULE_STATE_PREFIX}{request_id}")
}

/// Secondary index of module states per agent and module, scored by
/// transition timestamp. Members are primary keys.
pub fn module_state_index(agent_id: &str, module_name: &str) -> String {
    format!("module_states:{agent_id}:{module_name}")
}

pub fn result(agent_id: &str, request_id: &str) -> String {
    format!("result:{agent_id}:{request_id}")
}

/// Secondary index of results per agent, scored by ingest time. Members are
/// primary keys.
pub fn result_index(agent_id: &str) -> String {
    format!("results:{agent_id}")
}

/// Idempotency mark for a request id.
pub fn processed(request_id: &str) -> String {
    format!("processed:{request_id}")
}

pub fn task(task_id: &str) -> String {
    format!("task:{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_deployment() {
        assert_eq!(agent("a1"), "agent:a1");
        assert_eq!(module_state("w1"), "module_state:w1");
        assert_eq!(module_state_index("a1", "ping_module"), "module_states:a1:ping_module");
        assert_eq!(result("a1", "w1"), "result:a1:w1");
        assert_eq!(result_index("a1"), "results:a1");
        assert_eq!(processed("w1"), "processed:w1");
        assert_eq!(task("t1"), "task:t1");
    }
}
