use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::util::lock;

use super::scope::PathScope;
use super::types::{DiagnosticsChange, DiagnosticsSource, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// An in-scope change notification arrived within the grace period.
    Notified,
    TimedOut,
}

/// Per-run view of the diagnostics feed, scoped to the run's working path.
///
/// `errors_observed` / `warnings_observed` only ever go from `false` to `true`
/// while the tracker lives. Clones share state.
#[derive(Clone)]
pub struct DiagnosticsTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    scope: PathScope,
    errors: AtomicBool,
    warnings: AtomicBool,
    /// Bumped after each in-scope notification has been classified.
    generation: watch::Sender<u64>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl DiagnosticsTracker {
    /// Subscribes to `source` immediately; notifications published after this
    /// call are observed.
    pub fn attach(source: Arc<dyn DiagnosticsSource>, working_path: impl AsRef<Path>) -> Self {
        let rx = source.subscribe();
        let (generation, _) = watch::channel(0u64);
        let inner = Arc::new(TrackerInner {
            scope: PathScope::new(working_path),
            errors: AtomicBool::new(false),
            warnings: AtomicBool::new(false),
            generation,
            listener: Mutex::new(None),
        });

        let handle = tokio::spawn(listen(Arc::downgrade(&inner), source, rx));
        *lock(&inner.listener) = Some(handle);

        Self { inner }
    }

    pub fn scope(&self) -> &PathScope {
        &self.inner.scope
    }

    pub fn errors_observed(&self) -> bool {
        self.inner.errors.load(Ordering::SeqCst)
    }

    pub fn warnings_observed(&self) -> bool {
        self.inner.warnings.load(Ordering::SeqCst)
    }

    /// Waits for the next in-scope change notification, at most `grace`.
    ///
    /// The wait starts when this method is called, not when the returned
    /// future is first polled. Its timer is dropped as soon as the wait resolves.
    pub fn settle(&self, grace: Duration) -> impl Future<Output = SettleOutcome> + Send + 'static {
        let mut rx = self.inner.generation.subscribe();
        async move {
            match tokio::time::timeout(grace, rx.changed()).await {
                Ok(Ok(())) => SettleOutcome::Notified,
                _ => SettleOutcome::TimedOut,
            }
        }
    }

    /// Releases the feed subscription. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(handle) = lock(&self.inner.listener).take() {
            handle.abort();
            trace!(target: "buildq.diagnostics", scope = %self.inner.scope.prefix().display(), "tracker disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.listener).is_none()
    }
}

impl TrackerInner {
    fn observe(&self, source: &dyn DiagnosticsSource, change: &DiagnosticsChange) {
        let mut relevant = false;
        for uri in change.uris.iter().filter(|uri| self.scope.contains(uri)) {
            relevant = true;
            for diagnostic in source.diagnostics(uri) {
                match diagnostic.severity {
                    Severity::Error => self.errors.store(true, Ordering::SeqCst),
                    Severity::Warning => self.warnings.store(true, Ordering::SeqCst),
                    Severity::Information | Severity::Hint => {}
                }
            }
        }

        if relevant {
            trace!(
                target: "buildq.diagnostics",
                scope = %self.scope.prefix().display(),
                errors = self.errors.load(Ordering::SeqCst),
                warnings = self.warnings.load(Ordering::SeqCst),
                "in-scope diagnostics change"
            );
            self.generation.send_modify(|g| *g += 1);
        }
    }
}

async fn listen(
    inner: Weak<TrackerInner>,
    source: Arc<dyn DiagnosticsSource>,
    mut rx: broadcast::Receiver<DiagnosticsChange>,
) {
    loop {
        let change = match rx.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "buildq.diagnostics", skipped, "diagnostics notifications dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.observe(source.as_ref(), &change);
    }
}
