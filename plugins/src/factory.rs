use std::sync::Arc;

use buildq_core::config::{AppConfig, RunnerConfig};
use buildq_core::host::{LocalTaskHost, TaskFactory};
use buildq_core::runner::ProcessPlugin;
use buildq_core::{RunStore, SchedulerServices};

use crate::diagnostics::DiagnosticsHub;
use crate::runner::LocalProcessPlugin;
use crate::terminal::StdioTerminals;

pub fn build_process_plugin(cfg: &RunnerConfig) -> Arc<dyn ProcessPlugin> {
    Arc::new(LocalProcessPlugin::new(cfg.shell))
}

pub fn build_terminals(cfg: &RunnerConfig) -> Arc<StdioTerminals> {
    Arc::new(StdioTerminals::stdout(cfg.capture_bytes))
}

/// Scheduler collaborators plus the diagnostics hub feeds publish into.
pub struct LocalWiring {
    pub services: SchedulerServices,
    pub hub: Arc<DiagnosticsHub>,
}

/// Wires a local process host, stdout terminals and an in-memory hub.
pub fn build_local(cfg: &AppConfig, tasks: Arc<dyn TaskFactory>) -> LocalWiring {
    let store = RunStore::new();
    let terminals = build_terminals(&cfg.runner);
    let hub = Arc::new(DiagnosticsHub::new());
    let host = LocalTaskHost::new(
        build_process_plugin(&cfg.runner),
        terminals.clone(),
        store.clone(),
    );
    LocalWiring {
        services: SchedulerServices {
            host: Arc::new(host),
            tasks,
            diagnostics: hub.clone(),
            terminals,
            store,
        },
        hub,
    }
}
