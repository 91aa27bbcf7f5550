//! Task execution facility: the seam between the scheduler and whatever
//! actually runs a job.

mod local;
mod traits;
mod types;

pub use local::LocalTaskHost;
pub use traits::{TaskExecution, TaskFactory, TaskHost};
pub use types::{TaskDefinition, TaskEnd, TaskSpec, MANAGED_TASK_KIND};
