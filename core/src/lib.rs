//! Core of buildq: a bounded-parallel scheduler for build jobs ("targets").
//!
//! A job's final status is derived from two independent signals: the exit code
//! of its process and the diagnostics feed scoped to its working path. The
//! scheduler correlates both into exactly one terminal [`RunUpdate`] per run.
//!
//! # Architecture
//!
//! ```text
//! Scheduler::enqueue()
//!   ↓
//! mailbox → SchedulerActor (Gate: pending FIFO + running map)
//!   ↓ dispatch
//! TaskFactory::build() → TaskHost::execute() → ProcessRunner (+ WarningScanner)
//!   ↓ TaskEnd                              ↘ DiagnosticsTracker (scoped feed)
//! resolver: non-zero → failed | zero → settle(grace) → failed / warning / success
//!   ↓
//! UpdateStream (broadcast RunUpdate)
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod job;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod terminal;
pub mod updates;
pub mod util;

pub use job::{BuildRequest, CommandOptions, JobKey, RunStatus, RunUpdate};
pub use scheduler::{Scheduler, SchedulerServices, SchedulerSnapshot};
pub use store::RunStore;
pub use updates::UpdateStream;
