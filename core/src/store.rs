//! Explicit shared context between the scheduler and its task host.
//!
//! Holds the textual-warning flags recorded by the process runner when a run
//! finishes, and the JobKey → output-sink name mapping used by `reveal`.
//! Entries live exactly as long as the run's bookkeeping.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::job::JobKey;
use crate::util::lock;

#[derive(Clone, Default)]
pub struct RunStore {
    inner: Arc<Mutex<RunStoreInner>>,
}

#[derive(Default)]
struct RunStoreInner {
    warnings: HashMap<JobKey, bool>,
    sinks: HashMap<JobKey, String>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the final observed-warning flag of a finished process.
    pub fn record_warning(&self, key: &JobKey, observed: bool) {
        let mut g = lock(&self.inner);
        let slot = g.warnings.entry(key.clone()).or_insert(false);
        *slot |= observed;
    }

    pub fn warning_observed(&self, key: &JobKey) -> bool {
        lock(&self.inner)
            .warnings
            .get(key)
            .copied()
            .unwrap_or(false)
    }

    pub fn register_sink(&self, key: &JobKey, name: impl Into<String>) {
        lock(&self.inner).sinks.insert(key.clone(), name.into());
    }

    pub fn sink_name(&self, key: &JobKey) -> Option<String> {
        lock(&self.inner).sinks.get(key).cloned()
    }

    /// Drops everything known about `key`.
    pub fn forget(&self, key: &JobKey) {
        let mut g = lock(&self.inner);
        g.warnings.remove(key);
        g.sinks.remove(key);
    }
}
