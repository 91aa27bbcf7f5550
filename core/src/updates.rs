//! Fan-out channel carrying run status transitions to observers.
use tokio::sync::broadcast;

use crate::job::RunUpdate;

#[derive(Clone)]
pub struct UpdateStream {
    tx: broadcast::Sender<RunUpdate>,
}

impl UpdateStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunUpdate> {
        self.tx.subscribe()
    }

    /// Publishes `update`; having no subscribers is not an error.
    pub fn emit(&self, update: RunUpdate) {
        tracing::debug!(
            target: "buildq.updates",
            module_id = %update.module_id,
            target_name = %update.target,
            status = %update.status,
            exit_code = ?update.exit_code,
            receivers = self.tx.receiver_count(),
            "run update"
        );
        let _ = self.tx.send(update);
    }
}
