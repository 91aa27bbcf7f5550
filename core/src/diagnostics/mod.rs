//! Diagnostics correlation: watches an external diagnostics feed for the
//! resources under a job's working path.

mod scope;
mod tracker;
mod types;

pub use scope::{normalize_path, PathScope};
pub use tracker::{DiagnosticsTracker, SettleOutcome};
pub use types::{Diagnostic, DiagnosticsChange, DiagnosticsSource, Severity};
