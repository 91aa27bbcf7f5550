use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// One change notification: the resources whose diagnostics changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticsChange {
    pub uris: Vec<String>,
}

impl DiagnosticsChange {
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: uris.into_iter().map(Into::into).collect(),
        }
    }
}

/// The external diagnostics facility.
pub trait DiagnosticsSource: Send + Sync {
    /// Change notifications published after this call.
    fn subscribe(&self) -> broadcast::Receiver<DiagnosticsChange>;

    /// Current diagnostics for one resource.
    fn diagnostics(&self, uri: &str) -> Vec<Diagnostic>;
}
