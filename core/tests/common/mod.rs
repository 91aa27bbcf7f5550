#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use buildq_core::config::SchedulerConfig;
use buildq_core::diagnostics::{Diagnostic, DiagnosticsChange, DiagnosticsSource, Severity};
use buildq_core::error::HostError;
use buildq_core::host::{TaskDefinition, TaskEnd, TaskExecution, TaskFactory, TaskHost, TaskSpec};
use buildq_core::terminal::{OutputSink, TerminalRegistry};
use buildq_core::{BuildRequest, JobKey, RunStore, RunUpdate, Scheduler, SchedulerServices};
use tokio::sync::broadcast;

pub const GRACE: Duration = Duration::from_millis(750);
pub const KILLED_EXIT: i32 = 137;

/// Task host that never spawns anything; tests decide when tasks end.
pub struct FakeHost {
    ends: broadcast::Sender<TaskEnd>,
    store: RunStore,
    started: Mutex<Vec<String>>,
    terminated: Arc<Mutex<Vec<String>>>,
    refuse: AtomicBool,
    execute_delay: Mutex<Option<Duration>>,
}

impl FakeHost {
    pub fn new(store: RunStore) -> Arc<Self> {
        let (ends, _) = broadcast::channel(64);
        Arc::new(Self {
            ends,
            store,
            started: Mutex::new(Vec::new()),
            terminated: Arc::new(Mutex::new(Vec::new())),
            refuse: AtomicBool::new(false),
            execute_delay: Mutex::new(None),
        })
    }

    /// Makes every later `execute` take `delay` before it returns.
    pub fn delay_executions(&self, delay: Duration) {
        *self.execute_delay.lock().unwrap() = Some(delay);
    }

    pub fn refuse_executions(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Task names in execution order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        let mut names = self.terminated.lock().unwrap().clone();
        names.sort();
        names
    }

    /// Publishes the end signal a real host would emit for `key`.
    pub fn finish(&self, key: &JobKey, exit_code: i32) {
        let _ = self.ends.send(TaskEnd {
            definition: TaskDefinition::managed(key),
            exit_code,
        });
    }

    /// Clean exit after the runner saw a warning line in the output.
    pub fn finish_with_text_warning(&self, key: &JobKey) {
        self.store.record_warning(key, true);
        self.finish(key, 0);
    }

    /// End signal from unrelated host activity.
    pub fn finish_foreign(&self, name: &str, exit_code: i32) {
        let _ = self.ends.send(TaskEnd {
            definition: TaskDefinition {
                kind: "shell".into(),
                module_id: None,
                target: Some(name.into()),
            },
            exit_code,
        });
    }
}

struct FakeExecution {
    name: String,
    definition: TaskDefinition,
    ends: broadcast::Sender<TaskEnd>,
    terminated: Arc<Mutex<Vec<String>>>,
    done: AtomicBool,
}

impl TaskExecution for FakeExecution {
    /// Behaves like a killed process: one end signal with a signal exit code.
    fn terminate(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.terminated.lock().unwrap().push(self.name.clone());
        let _ = self.ends.send(TaskEnd {
            definition: self.definition.clone(),
            exit_code: KILLED_EXIT,
        });
    }
}

#[async_trait]
impl TaskHost for FakeHost {
    async fn execute(&self, task: TaskSpec) -> Result<Box<dyn TaskExecution>, HostError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("fake host is refusing work".into()));
        }
        let delay = *self.execute_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.started.lock().unwrap().push(task.name.clone());
        Ok(Box::new(FakeExecution {
            name: task.name,
            definition: task.definition,
            ends: self.ends.clone(),
            terminated: self.terminated.clone(),
            done: AtomicBool::new(false),
        }))
    }

    fn subscribe_ends(&self) -> broadcast::Receiver<TaskEnd> {
        self.ends.subscribe()
    }
}

/// Describes every request as `make <target>`; modules listed in `broken` fail.
#[derive(Default)]
pub struct FakeFactory {
    pub broken: HashSet<String>,
}

impl TaskFactory for FakeFactory {
    fn build(&self, request: &BuildRequest) -> anyhow::Result<TaskSpec> {
        if self.broken.contains(&request.module_id) {
            anyhow::bail!("no build tool configured for {}", request.module_id);
        }
        Ok(TaskSpec::for_request(
            request,
            "make",
            vec![request.target.clone()],
        ))
    }
}

/// In-memory diagnostics engine keyed by file URI.
pub struct FakeDiagnostics {
    tx: broadcast::Sender<DiagnosticsChange>,
    entries: Mutex<HashMap<String, Vec<Diagnostic>>>,
}

impl FakeDiagnostics {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(Self {
            tx,
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn publish(&self, path: &str, severity: Severity, message: &str) {
        let uri = format!("file://{path}");
        self.entries
            .lock()
            .unwrap()
            .entry(uri.clone())
            .or_default()
            .push(Diagnostic::new(severity, message));
        let _ = self.tx.send(DiagnosticsChange::new([uri]));
    }
}

impl DiagnosticsSource for FakeDiagnostics {
    fn subscribe(&self) -> broadcast::Receiver<DiagnosticsChange> {
        self.tx.subscribe()
    }

    fn diagnostics(&self, uri: &str) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct RecordingTerminals {
    pub text: Arc<Mutex<HashMap<String, String>>>,
    pub revealed: Mutex<Vec<String>>,
    pub cleared: AtomicBool,
}

struct RecordingSink {
    name: String,
    text: Arc<Mutex<HashMap<String, String>>>,
}

impl OutputSink for RecordingSink {
    fn append(&self, text: &str) {
        self.text
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .push_str(text);
    }
}

impl RecordingTerminals {
    pub fn output(&self, name: &str) -> String {
        self.text
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl TerminalRegistry for RecordingTerminals {
    fn open(&self, name: &str) -> Arc<dyn OutputSink> {
        self.text
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Arc::new(RecordingSink {
            name: name.to_string(),
            text: self.text.clone(),
        })
    }

    fn reveal(&self, name: &str) -> bool {
        let known = self.text.lock().unwrap().contains_key(name);
        if known {
            self.revealed.lock().unwrap().push(name.to_string());
        }
        known
    }

    fn close_all(&self) {
        self.text.lock().unwrap().clear();
        self.cleared.store(true, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub host: Arc<FakeHost>,
    pub diagnostics: Arc<FakeDiagnostics>,
    pub terminals: Arc<RecordingTerminals>,
    pub store: RunStore,
    pub updates: broadcast::Receiver<RunUpdate>,
}

pub fn harness(max_parallel: usize) -> Harness {
    harness_with(max_parallel, FakeFactory::default())
}

pub fn harness_with(max_parallel: usize, factory: FakeFactory) -> Harness {
    let store = RunStore::new();
    let host = FakeHost::new(store.clone());
    let diagnostics = FakeDiagnostics::new();
    let terminals = Arc::new(RecordingTerminals::default());
    let cfg = SchedulerConfig {
        max_parallel,
        grace_period_ms: GRACE.as_millis() as u64,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::start(
        &cfg,
        SchedulerServices {
            host: host.clone(),
            tasks: Arc::new(factory),
            diagnostics: diagnostics.clone(),
            terminals: terminals.clone(),
            store: store.clone(),
        },
    );
    let updates = scheduler.subscribe();
    Harness {
        scheduler,
        host,
        diagnostics,
        terminals,
        store,
        updates,
    }
}

pub fn request(module: &str, target: &str) -> BuildRequest {
    BuildRequest::new(module, target, format!("/ws/{module}"))
}

/// Next update, failing the test if none arrives within a minute of (virtual) time.
pub async fn next_update(rx: &mut broadcast::Receiver<RunUpdate>) -> RunUpdate {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for a run update")
        .expect("update stream closed")
}

/// Lets the scheduler drain its mailbox without advancing the clock meaningfully.
pub async fn settle_mailbox() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
