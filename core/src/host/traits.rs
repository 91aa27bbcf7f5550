use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::HostError;
use crate::job::BuildRequest;

use super::types::{TaskEnd, TaskSpec};

/// Handle to one submitted task.
pub trait TaskExecution: Send + Sync {
    /// Requests termination. The end signal still arrives through the host.
    fn terminate(&self);
}

#[async_trait]
pub trait TaskHost: Send + Sync {
    /// Starts `task`. Resolves once the host has accepted it.
    async fn execute(&self, task: TaskSpec) -> Result<Box<dyn TaskExecution>, HostError>;

    /// End-of-process notifications for every task this host runs, managed or not.
    fn subscribe_ends(&self) -> broadcast::Receiver<TaskEnd>;
}

/// Builds the command line / task description for a request.
pub trait TaskFactory: Send + Sync {
    fn build(&self, request: &BuildRequest) -> anyhow::Result<TaskSpec>;
}
