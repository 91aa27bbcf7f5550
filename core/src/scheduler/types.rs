use tokio::sync::oneshot;
use uuid::Uuid;

use crate::diagnostics::SettleOutcome;
use crate::error::HostError;
use crate::host::TaskExecution;
use crate::job::{BuildRequest, JobKey};

/// Point-in-time view of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedulerSnapshot {
    /// FIFO order.
    pub pending: Vec<JobKey>,
    /// Includes runs still awaiting their diagnostics grace period.
    pub running: Vec<JobKey>,
    pub max_parallel: usize,
}

pub(crate) enum Command {
    Enqueue(BuildRequest),
    SetMaxParallel(usize),
    StopAll,
    Reveal(JobKey),
    ClearAllTerminals,
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    Dispose,
}

/// Completions of work the coordinating task started but did not await.
pub(crate) enum Event {
    Started {
        key: JobKey,
        run_id: Uuid,
        result: Result<Box<dyn TaskExecution>, HostError>,
    },
    Settled {
        key: JobKey,
        run_id: Uuid,
        outcome: SettleOutcome,
    },
}
