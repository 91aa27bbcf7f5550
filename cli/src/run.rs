use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use buildq_core::config::AppConfig;
use buildq_core::{BuildRequest, JobKey, RunStatus, RunUpdate, Scheduler};
use buildq_plugins::diagnostics::{ingest_jsonl, DiagnosticsHub};
use buildq_plugins::factory::build_local;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::error::CliError;
use crate::plan::PlanTaskFactory;

/// Exit code after Ctrl-C.
pub const INTERRUPTED_EXIT: i32 = 130;

pub fn render_update(update: &RunUpdate) -> String {
    match update.exit_code {
        Some(code) => format!(
            "buildq: {}:{} {} (exit {code})",
            update.module_id, update.target, update.status
        ),
        None => format!(
            "buildq: {}:{} {}",
            update.module_id, update.target, update.status
        ),
    }
}

/// Final statuses keyed by job; jobs that never resolved are absent.
///
/// `lost` holds jobs that finished while updates lagged, so their status is
/// unknown.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: BTreeMap<JobKey, RunStatus>,
    pub lost: BTreeSet<JobKey>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            INTERRUPTED_EXIT
        } else if !self.lost.is_empty()
            || self.results.values().any(|s| *s == RunStatus::Failed)
        {
            1
        } else {
            0
        }
    }

    pub fn render(&self) -> String {
        let count = |status| self.results.values().filter(|s| **s == status).count();
        let lost = if self.lost.is_empty() {
            String::new()
        } else {
            format!(", {} unknown", self.lost.len())
        };
        format!(
            "buildq: {} succeeded, {} with warnings, {} failed{lost}{}",
            count(RunStatus::Success),
            count(RunStatus::Warning),
            count(RunStatus::Failed),
            if self.interrupted { " (interrupted)" } else { "" }
        )
    }

    /// Drops jobs the scheduler no longer tracks from `outstanding` and
    /// records them as lost.
    fn resync(&mut self, outstanding: &mut HashSet<JobKey>, active: &[JobKey]) {
        let gone: Vec<JobKey> = outstanding
            .iter()
            .filter(|k| !active.contains(k))
            .cloned()
            .collect();
        for key in gone {
            warn!(job = %key, "final status lost while updates lagged");
            outstanding.remove(&key);
            self.lost.insert(key);
        }
    }
}

/// Runs `requests` to completion and returns the process exit code.
pub async fn run_jobs(
    cfg: &AppConfig,
    requests: Vec<BuildRequest>,
    diagnostics_feed: Option<&Path>,
) -> Result<i32, CliError> {
    let wiring = build_local(cfg, Arc::new(PlanTaskFactory::new(cfg.runner.shell)));
    if let Some(feed) = diagnostics_feed {
        let file = tokio::fs::File::open(feed).await?;
        spawn_feed(BufReader::new(file), wiring.hub.clone());
    }

    let scheduler = Scheduler::start(&cfg.scheduler, wiring.services);
    let mut updates = scheduler.subscribe();

    let mut outstanding: HashSet<JobKey> = requests.iter().map(BuildRequest::key).collect();
    info!(jobs = outstanding.len(), max_parallel = cfg.scheduler.max_parallel, "starting run");
    for request in requests {
        scheduler.enqueue(request);
    }

    let mut summary = RunSummary::default();
    let mut ctrl_c_armed = true;
    while !outstanding.is_empty() {
        tokio::select! {
            res = tokio::signal::ctrl_c(), if ctrl_c_armed => {
                if let Err(e) = res {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    ctrl_c_armed = false;
                    continue;
                }
                if summary.interrupted {
                    eprintln!("buildq: interrupted again; not waiting for running jobs");
                    break;
                }
                eprintln!("buildq: interrupted; stopping all jobs");
                summary.interrupted = true;
                scheduler.stop_all();
                // Dropped pending jobs never report; keep waiting only for running ones.
                match scheduler.snapshot().await {
                    Some(snap) => outstanding.retain(|k| snap.running.contains(k)),
                    None => break,
                }
            }
            update = updates.recv() => match update {
                Ok(update) => {
                    println!("{}", render_update(&update));
                    if update.status.is_terminal() {
                        let key = update.key();
                        outstanding.remove(&key);
                        summary.results.insert(key, update.status);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "status updates lagged");
                    match scheduler.snapshot().await {
                        Some(snap) => {
                            let active: Vec<JobKey> =
                                snap.running.into_iter().chain(snap.pending).collect();
                            summary.resync(&mut outstanding, &active);
                        }
                        None => break,
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.clear_all_terminals();
    scheduler.dispose();
    println!("{}", summary.render());
    Ok(summary.exit_code())
}

fn spawn_feed<R>(reader: R, hub: Arc<DiagnosticsHub>)
where
    R: tokio::io::AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match ingest_jsonl(reader, &hub).await {
            Ok(n) => info!(target: "buildq.diagnostics", records = n, "diagnostics feed ended"),
            Err(e) => warn!(target: "buildq.diagnostics", error = %e, "diagnostics feed failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_updates_with_and_without_exit_code() {
        let key = JobKey::new("app", "test");
        assert_eq!(
            render_update(&RunUpdate::new(&key, RunStatus::Running, None)),
            "buildq: app:test running"
        );
        assert_eq!(
            render_update(&RunUpdate::new(&key, RunStatus::Warning, Some(0))),
            "buildq: app:test warning (exit 0)"
        );
    }

    #[test]
    fn summary_exit_code_reflects_failures_and_interrupts() {
        let mut summary = RunSummary::default();
        summary
            .results
            .insert(JobKey::new("a", "build"), RunStatus::Warning);
        assert_eq!(summary.exit_code(), 0);

        summary
            .results
            .insert(JobKey::new("a", "test"), RunStatus::Failed);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.render(),
            "buildq: 0 succeeded, 1 with warnings, 1 failed"
        );

        summary.interrupted = true;
        assert_eq!(summary.exit_code(), INTERRUPTED_EXIT);
    }

    #[test]
    fn jobs_lost_during_lag_count_as_unknown() {
        let mut summary = RunSummary::default();
        summary
            .results
            .insert(JobKey::new("a", "build"), RunStatus::Success);
        let mut outstanding: HashSet<JobKey> = [
            JobKey::new("a", "test"),
            JobKey::new("b", "build"),
            JobKey::new("c", "build"),
        ]
        .into_iter()
        .collect();

        summary.resync(&mut outstanding, &[JobKey::new("c", "build")]);

        assert_eq!(outstanding, HashSet::from([JobKey::new("c", "build")]));
        assert_eq!(
            summary.lost,
            BTreeSet::from([JobKey::new("a", "test"), JobKey::new("b", "build")])
        );
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.render(),
            "buildq: 1 succeeded, 0 with warnings, 0 failed, 2 unknown"
        );
    }
}
