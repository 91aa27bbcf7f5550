use std::collections::HashMap;

use buildq_core::diagnostics::{Diagnostic, DiagnosticsChange, DiagnosticsSource};
use buildq_core::util::lock;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// In-memory diagnostics store. Holds whatever was last published per URI.
pub struct DiagnosticsHub {
    entries: Mutex<HashMap<String, Vec<Diagnostic>>>,
    changes: broadcast::Sender<DiagnosticsChange>,
}

impl DiagnosticsHub {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Replaces the diagnostics of `uri` and notifies subscribers.
    pub fn publish(&self, uri: impl Into<String>, diagnostics: Vec<Diagnostic>) {
        let uri = uri.into();
        {
            let mut entries = lock(&self.entries);
            if diagnostics.is_empty() {
                entries.remove(&uri);
            } else {
                entries.insert(uri.clone(), diagnostics);
            }
        }
        let _ = self.changes.send(DiagnosticsChange::new([uri]));
    }

    pub fn clear(&self, uri: &str) {
        self.publish(uri, Vec::new());
    }

    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = lock(&self.entries).keys().cloned().collect();
        uris.sort();
        uris
    }
}

impl Default for DiagnosticsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsSource for DiagnosticsHub {
    fn subscribe(&self) -> broadcast::Receiver<DiagnosticsChange> {
        self.changes.subscribe()
    }

    fn diagnostics(&self, uri: &str) -> Vec<Diagnostic> {
        lock(&self.entries).get(uri).cloned().unwrap_or_default()
    }
}
