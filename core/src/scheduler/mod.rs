//! Request queue, concurrency gate and status resolution.
//!
//! All queue/running state is owned by a single coordinating task
//! ([`actor`]) that consumes a serialized mailbox of commands (from
//! [`Scheduler`] handles), internal events (start confirmations, settled
//! diagnostics waits) and task end signals. Every handler runs to completion
//! before the next message is taken, so no locks guard the gate.

mod actor;
mod gate;
mod handle;
mod resolver;
mod types;

pub use handle::{Scheduler, SchedulerServices};
pub use resolver::{resolve_exit, resolve_settled};
pub use types::SchedulerSnapshot;
