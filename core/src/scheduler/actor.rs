use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::diagnostics::{DiagnosticsTracker, SettleOutcome};
use crate::error::HostError;
use crate::host::{TaskEnd, TaskExecution};
use crate::job::{BuildRequest, JobKey, RunStatus, RunUpdate};
use crate::updates::UpdateStream;

use super::gate::Gate;
use super::handle::SchedulerServices;
use super::resolver::{resolve_exit, resolve_settled};
use super::types::{Command, Event, SchedulerSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    /// Host `execute` has not returned yet.
    Starting,
    Running,
    /// Exited cleanly; waiting out the diagnostics grace period.
    Settling { exit_code: i32 },
}

struct ActiveRun {
    run_id: Uuid,
    working_path: PathBuf,
    phase: RunPhase,
    execution: Option<Box<dyn TaskExecution>>,
    tracker: DiagnosticsTracker,
    stop_requested: bool,
    started_at: Instant,
}

/// Sole owner of the gate. Consumes one message at a time.
pub(crate) struct SchedulerActor {
    gate: Gate<ActiveRun>,
    services: SchedulerServices,
    updates: UpdateStream,
    grace: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    ends: broadcast::Receiver<TaskEnd>,
}

impl SchedulerActor {
    pub(crate) fn new(
        cfg: &SchedulerConfig,
        services: SchedulerServices,
        updates: UpdateStream,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let ends = services.host.subscribe_ends();
        Self {
            gate: Gate::new(cfg.effective_max_parallel()),
            services,
            updates,
            grace: cfg.grace_period(),
            commands,
            events_tx,
            events,
            ends,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut ends_open = true;
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        debug!(target: "buildq.gate", "all scheduler handles dropped");
                        self.shutdown();
                        break;
                    };
                    if self.on_command(cmd).is_break() {
                        break;
                    }
                }
                Some(event) = self.events.recv() => self.on_event(event),
                end = self.ends.recv(), if ends_open => match end {
                    Ok(end) => self.on_task_end(end),
                    Err(RecvError::Lagged(n)) => {
                        warn!(target: "buildq.gate", skipped = n, "task end signals lagged");
                    }
                    Err(RecvError::Closed) => {
                        warn!(target: "buildq.gate", "task host closed its end signal channel");
                        ends_open = false;
                    }
                },
            }
        }
        self.events.close();
        while let Ok(event) = self.events.try_recv() {
            if let Event::Started {
                key,
                result: Ok(execution),
                ..
            } = event
            {
                debug!(target: "buildq.gate", job = %key, "terminating execution started during shutdown");
                execution.terminate();
            }
        }
        debug!(target: "buildq.gate", "scheduler stopped");
    }

    fn on_command(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Enqueue(request) => {
                let key = request.key();
                if self.gate.admit(request) {
                    debug!(target: "buildq.gate", job = %key, "queued");
                    self.dispatch();
                } else {
                    debug!(target: "buildq.gate", job = %key, "already queued or running; ignored");
                }
            }
            Command::SetMaxParallel(n) => {
                self.gate.set_max_parallel(n);
                info!(
                    target: "buildq.gate",
                    max_parallel = self.gate.max_parallel(),
                    "concurrency limit changed"
                );
                self.dispatch();
            }
            Command::StopAll => self.stop_all(),
            Command::Reveal(key) => match self.services.store.sink_name(&key) {
                Some(name) => {
                    if !self.services.terminals.reveal(&name) {
                        debug!(target: "buildq.gate", job = %key, sink = %name, "sink no longer open");
                    }
                }
                None => debug!(target: "buildq.gate", job = %key, "no output sink for job"),
            },
            Command::ClearAllTerminals => self.services.terminals.close_all(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Dispose => {
                self.shutdown();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Started {
                key,
                run_id,
                result,
            } => self.on_started(key, run_id, result),
            Event::Settled {
                key,
                run_id,
                outcome,
            } => self.on_settled(key, run_id, outcome),
        }
    }

    /// Promotes pending requests while running slots are free.
    fn dispatch(&mut self) {
        while let Some(request) = self.gate.next_ready() {
            self.start(request);
        }
    }

    fn start(&mut self, request: BuildRequest) {
        let key = request.key();
        let spec = match self.services.tasks.build(&request) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(target: "buildq.gate", job = %key, error = %e, "cannot describe task");
                self.services
                    .terminals
                    .open(&request.display_name())
                    .append(&format!("Failed to prepare task: {e:#}\r\n"));
                self.updates
                    .emit(RunUpdate::new(&key, RunStatus::Failed, Some(1)));
                return;
            }
        };

        let run_id = Uuid::new_v4();
        let tracker =
            DiagnosticsTracker::attach(self.services.diagnostics.clone(), &request.working_path);
        self.services.store.register_sink(&key, spec.name.clone());
        self.gate.insert_run(
            key.clone(),
            ActiveRun {
                run_id,
                working_path: request.working_path.clone(),
                phase: RunPhase::Starting,
                execution: None,
                tracker,
                stop_requested: false,
                started_at: Instant::now(),
            },
        );
        info!(
            target: "buildq.gate",
            job = %key,
            %run_id,
            running = self.gate.running_len(),
            max_parallel = self.gate.max_parallel(),
            "dispatched"
        );
        self.updates
            .emit(RunUpdate::new(&key, RunStatus::Running, None));

        let host = self.services.host.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = host.execute(spec).await;
            let sent = events.send(Event::Started {
                key,
                run_id,
                result,
            });
            // The actor is gone; nobody else can stop this process.
            if let Err(mpsc::error::SendError(Event::Started {
                key,
                result: Ok(execution),
                ..
            })) = sent
            {
                debug!(target: "buildq.gate", job = %key, "scheduler stopped during start; terminating");
                execution.terminate();
            }
        });
    }

    fn on_started(
        &mut self,
        key: JobKey,
        run_id: Uuid,
        result: Result<Box<dyn TaskExecution>, HostError>,
    ) {
        let Some(run) = self.gate.run_mut(&key).filter(|r| r.run_id == run_id) else {
            debug!(target: "buildq.gate", job = %key, %run_id, "start confirmation for finished run");
            return;
        };
        match result {
            Ok(execution) => {
                if run.stop_requested {
                    execution.terminate();
                }
                if run.phase == RunPhase::Starting {
                    run.phase = RunPhase::Running;
                }
                run.execution = Some(execution);
            }
            Err(e) => {
                warn!(target: "buildq.gate", job = %key, error = %e, "task host could not start job");
                if let Some(sink) = self.services.store.sink_name(&key) {
                    self.services
                        .terminals
                        .open(&sink)
                        .append(&format!("Failed to start task: {e}\r\n"));
                }
                self.finalize(&key, RunStatus::Failed, Some(1));
                self.dispatch();
            }
        }
    }

    fn on_task_end(&mut self, end: TaskEnd) {
        let Some(key) = end.definition.managed_key() else {
            return;
        };
        let grace = self.grace;
        let Some(run) = self.gate.run_mut(&key) else {
            debug!(target: "buildq.gate", job = %key, "end signal for job that is not running");
            return;
        };
        if matches!(run.phase, RunPhase::Settling { .. }) {
            debug!(target: "buildq.gate", job = %key, "duplicate end signal ignored");
            return;
        }

        if let Some(status) = resolve_exit(end.exit_code) {
            self.finalize(&key, status, Some(end.exit_code));
            self.dispatch();
            return;
        }

        run.phase = RunPhase::Settling {
            exit_code: end.exit_code,
        };
        debug!(
            target: "buildq.diagnostics",
            job = %key,
            scope = %run.working_path.display(),
            grace_ms = grace.as_millis() as u64,
            "awaiting diagnostics"
        );
        let settle = run.tracker.settle(grace);
        let run_id = run.run_id;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = settle.await;
            let _ = events.send(Event::Settled {
                key,
                run_id,
                outcome,
            });
        });
    }

    fn on_settled(&mut self, key: JobKey, run_id: Uuid, outcome: SettleOutcome) {
        let Some(run) = self.gate.run(&key).filter(|r| r.run_id == run_id) else {
            return;
        };
        let RunPhase::Settling { exit_code } = run.phase else {
            return;
        };
        let errors = run.tracker.errors_observed();
        let warnings = run.tracker.warnings_observed();
        let text_warning = self.services.store.warning_observed(&key);
        debug!(
            target: "buildq.diagnostics",
            job = %key,
            ?outcome,
            errors,
            warnings,
            text_warning,
            "diagnostics settled"
        );
        let status = resolve_settled(errors, warnings, text_warning);
        self.finalize(&key, status, Some(exit_code));
        self.dispatch();
    }

    /// Emits the terminal update, then drops all bookkeeping for `key`.
    fn finalize(&mut self, key: &JobKey, status: RunStatus, exit_code: Option<i32>) {
        let Some(run) = self.gate.remove_run(key) else {
            return;
        };
        info!(
            target: "buildq.resolver",
            job = %key,
            run_id = %run.run_id,
            status = %status,
            exit_code = ?exit_code,
            elapsed_ms = run.started_at.elapsed().as_millis() as u64,
            "job finished"
        );
        self.updates.emit(RunUpdate::new(key, status, exit_code));
        run.tracker.dispose();
        self.services.store.forget(key);
    }

    fn stop_all(&mut self) {
        let dropped = self.gate.drain_pending();
        for run in self.gate.runs_mut() {
            match &run.execution {
                Some(execution) => execution.terminate(),
                None => run.stop_requested = true,
            }
        }
        info!(
            target: "buildq.gate",
            dropped = dropped.len(),
            running = self.gate.running_len(),
            "stop requested"
        );
    }

    fn shutdown(&mut self) {
        self.stop_all();
        for key in self.gate.running_keys() {
            self.finalize(&key, RunStatus::Failed, None);
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            pending: self.gate.pending_keys(),
            running: self.gate.running_keys(),
            max_parallel: self.gate.max_parallel(),
        }
    }
}
