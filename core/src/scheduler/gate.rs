use std::collections::{HashMap, VecDeque};

use crate::job::{BuildRequest, JobKey};

/// Pending FIFO plus running map, generic over the per-run record.
///
/// A key is present at most once across both collections.
pub(crate) struct Gate<R> {
    pending: VecDeque<BuildRequest>,
    running: HashMap<JobKey, R>,
    max_parallel: usize,
}

impl<R> Gate<R> {
    pub(crate) fn new(max_parallel: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            running: HashMap::new(),
            max_parallel: max_parallel.max(1),
        }
    }

    pub(crate) fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Takes effect for future dispatches only; running jobs are never preempted.
    pub(crate) fn set_max_parallel(&mut self, n: usize) {
        self.max_parallel = n.max(1);
    }

    pub(crate) fn is_known(&self, key: &JobKey) -> bool {
        self.running.contains_key(key) || self.pending.iter().any(|r| &r.key() == key)
    }

    /// Appends `request` unless its key is already pending or running.
    pub(crate) fn admit(&mut self, request: BuildRequest) -> bool {
        if self.is_known(&request.key()) {
            return false;
        }
        self.pending.push_back(request);
        true
    }

    /// Pops the FIFO head if a running slot is free.
    pub(crate) fn next_ready(&mut self) -> Option<BuildRequest> {
        if self.running.len() >= self.max_parallel {
            return None;
        }
        self.pending.pop_front()
    }

    pub(crate) fn insert_run(&mut self, key: JobKey, run: R) {
        self.running.insert(key, run);
    }

    pub(crate) fn run(&self, key: &JobKey) -> Option<&R> {
        self.running.get(key)
    }

    pub(crate) fn run_mut(&mut self, key: &JobKey) -> Option<&mut R> {
        self.running.get_mut(key)
    }

    pub(crate) fn remove_run(&mut self, key: &JobKey) -> Option<R> {
        self.running.remove(key)
    }

    pub(crate) fn runs_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.running.values_mut()
    }

    /// Discards every pending request.
    pub(crate) fn drain_pending(&mut self) -> Vec<BuildRequest> {
        self.pending.drain(..).collect()
    }

    pub(crate) fn running_len(&self) -> usize {
        self.running.len()
    }

    pub(crate) fn pending_keys(&self) -> Vec<JobKey> {
        self.pending.iter().map(BuildRequest::key).collect()
    }

    /// Sorted for stable output.
    pub(crate) fn running_keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.running.keys().cloned().collect();
        keys.sort();
        keys
    }
}
