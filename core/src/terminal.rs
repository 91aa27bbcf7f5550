//! Output/terminal facility: one named sink per job.
use std::sync::Arc;

/// Live text destination for one job's combined output.
pub trait OutputSink: Send + Sync {
    fn append(&self, text: &str);
}

pub trait TerminalRegistry: Send + Sync {
    /// Opens (or reuses) the sink called `name`.
    fn open(&self, name: &str) -> Arc<dyn OutputSink>;

    /// Brings the sink to the foreground. Returns `false` when no sink has that name.
    fn reveal(&self, name: &str) -> bool;

    fn close_all(&self);
}
