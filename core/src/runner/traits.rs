use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::types::SpawnArgs;

/// A spawned OS process with piped output.
#[async_trait]
pub trait ProcessSession: Send {
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    /// Requests forcible termination. Succeeds if the process already exited.
    async fn kill(&mut self) -> anyhow::Result<()>;
    /// Waits for exit. `None` when the platform reports no exit code.
    async fn wait(&mut self) -> anyhow::Result<Option<i32>>;
}

/// Spawns processes; platform invocation quirks live behind this trait.
#[async_trait]
pub trait ProcessPlugin: Send + Sync {
    fn name(&self) -> &str;
    async fn spawn(&self, args: &SpawnArgs) -> anyhow::Result<Box<dyn ProcessSession>>;
}
