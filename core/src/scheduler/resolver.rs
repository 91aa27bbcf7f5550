//! Terminal status decisions.
//!
//! ```text
//! Pending → Running ─ exit ≠ 0 ──────────────────────────────→ Failed
//!                   └ exit = 0 → settle(grace) ─ errors ──────→ Failed
//!                                               ├ warnings ───→ Warning
//!                                               └ otherwise ──→ Success
//! ```
use crate::job::RunStatus;

/// Status decided by the exit code alone, or `None` when the diagnostics
/// grace period must be awaited first.
pub fn resolve_exit(exit_code: i32) -> Option<RunStatus> {
    (exit_code != 0).then_some(RunStatus::Failed)
}

/// Status of a zero-exit run once its grace period has resolved.
///
/// Errors take precedence over warnings; a warning may come from the
/// diagnostics feed or from the textual marker in the process output.
pub fn resolve_settled(errors: bool, diagnostic_warnings: bool, text_warning: bool) -> RunStatus {
    if errors {
        RunStatus::Failed
    } else if diagnostic_warnings || text_warning {
        RunStatus::Warning
    } else {
        RunStatus::Success
    }
}
