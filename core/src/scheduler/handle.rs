use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::diagnostics::DiagnosticsSource;
use crate::host::{TaskFactory, TaskHost};
use crate::job::{BuildRequest, JobKey, RunUpdate};
use crate::store::RunStore;
use crate::terminal::TerminalRegistry;
use crate::updates::UpdateStream;

use super::actor::SchedulerActor;
use super::types::{Command, SchedulerSnapshot};

/// Collaborators the scheduler drives. Passed explicitly at construction.
#[derive(Clone)]
pub struct SchedulerServices {
    pub host: Arc<dyn TaskHost>,
    pub tasks: Arc<dyn TaskFactory>,
    pub diagnostics: Arc<dyn DiagnosticsSource>,
    pub terminals: Arc<dyn TerminalRegistry>,
    pub store: RunStore,
}

/// Cloneable handle to a running scheduler.
///
/// Every method only posts a message; none of them block on job progress.
/// Once disposed (or once the coordinating task has stopped), further calls
/// are silently dropped.
#[derive(Clone)]
pub struct Scheduler {
    commands: mpsc::UnboundedSender<Command>,
    updates: UpdateStream,
}

impl Scheduler {
    /// Spawns the coordinating task on the current Tokio runtime.
    pub fn start(cfg: &SchedulerConfig, services: SchedulerServices) -> Self {
        let updates = UpdateStream::new(cfg.update_channel_capacity);
        let (commands, rx) = mpsc::unbounded_channel();
        let actor = SchedulerActor::new(cfg, services, updates.clone(), rx);
        tokio::spawn(actor.run());
        Self { commands, updates }
    }

    /// Queues `request` unless a job with the same key is pending or running.
    pub fn enqueue(&self, request: BuildRequest) {
        self.send(Command::Enqueue(request));
    }

    /// Values below 1 are treated as 1.
    pub fn set_max_parallel(&self, n: usize) {
        self.send(Command::SetMaxParallel(n));
    }

    /// Drops pending requests and terminates every running job.
    pub fn stop_all(&self) {
        self.send(Command::StopAll);
    }

    /// Brings the output sink of `module_id:target` to the foreground, if any.
    pub fn reveal(&self, module_id: &str, target: &str) {
        self.send(Command::Reveal(JobKey::new(module_id, target)));
    }

    pub fn clear_all_terminals(&self) {
        self.send(Command::ClearAllTerminals);
    }

    /// Stops everything; unresolved runs are reported as failed.
    pub fn dispose(&self) {
        self.send(Command::Dispose);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunUpdate> {
        self.updates.subscribe()
    }

    /// `None` once the scheduler has been disposed.
    pub async fn snapshot(&self) -> Option<SchedulerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    pub fn is_disposed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            debug!(target: "buildq.gate", "scheduler disposed; command dropped");
        }
    }
}
