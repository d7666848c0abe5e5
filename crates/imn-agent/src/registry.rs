use std::sync::Arc;

use crate::Module;
use crate::modules::{EchoModule, FaultyModule, PingModule, TcpingModule};

/// Instantiate the built-in modules, optionally restricted to `enabled`
/// names. An empty filter means all of them.
pub fn builtin_modules(enabled: &[String]) -> Vec<Arc<dyn Module>> {
    let all: Vec<Arc<dyn Module>> = vec![
        Arc::new(PingModule::new()),
        Arc::new(TcpingModule::new()),
        Arc::new(EchoModule::new("echo_module").expect("echo_module is registered")),
        Arc::new(EchoModule::new("working_module").expect("working_module is registered")),
        Arc::new(FaultyModule::new()),
    ];

    if enabled.is_empty() {
        return all;
    }
    all.into_iter()
        .filter(|module| enabled.iter().any(|name| name == module.spec().name))
        .collect()
}
