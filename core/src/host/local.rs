use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::HostError;
use crate::job::JobKey;
use crate::runner::{ProcessPlugin, ProcessRunner, RunnerCloseHandle, SpawnArgs};
use crate::store::RunStore;
use crate::terminal::TerminalRegistry;

use super::traits::{TaskExecution, TaskHost};
use super::types::{TaskEnd, TaskSpec};

const END_CHANNEL_CAPACITY: usize = 256;

/// Runs every task as a local process through a [`ProcessRunner`].
///
/// Output goes to the terminal sink named after the task; the textual
/// warning flag is recorded in the shared [`RunStore`] before the end
/// signal is published.
pub struct LocalTaskHost {
    plugin: Arc<dyn ProcessPlugin>,
    terminals: Arc<dyn TerminalRegistry>,
    store: RunStore,
    ends: broadcast::Sender<TaskEnd>,
}

impl LocalTaskHost {
    pub fn new(
        plugin: Arc<dyn ProcessPlugin>,
        terminals: Arc<dyn TerminalRegistry>,
        store: RunStore,
    ) -> Self {
        let (ends, _) = broadcast::channel(END_CHANNEL_CAPACITY);
        Self {
            plugin,
            terminals,
            store,
            ends,
        }
    }
}

struct LocalExecution {
    close: RunnerCloseHandle,
}

impl TaskExecution for LocalExecution {
    fn terminate(&self) {
        self.close.close();
    }
}

#[async_trait]
impl TaskHost for LocalTaskHost {
    async fn execute(&self, task: TaskSpec) -> Result<Box<dyn TaskExecution>, HostError> {
        if task.command.trim().is_empty() {
            return Err(HostError::InvalidTask(format!(
                "task `{}` has an empty command",
                task.name
            )));
        }

        let managed = task.definition.managed_key();
        let key = managed
            .clone()
            .unwrap_or_else(|| JobKey::new(task.definition.kind.clone(), task.name.clone()));

        let sink = self.terminals.open(&task.name);
        let mut args = SpawnArgs::new(task.command, task.args);
        args.cwd = task.cwd;

        let (runner, close) =
            ProcessRunner::new(key.clone(), args, self.plugin.clone(), sink, self.store.clone());

        let ends = self.ends.clone();
        let store = self.store.clone();
        let definition = task.definition;
        tokio::spawn(async move {
            let exit_code = runner.run().await;
            if managed.is_none() {
                store.forget(&key);
            }
            debug!(target: "buildq.runner", task = %key, exit_code, "task ended");
            let _ = ends.send(TaskEnd {
                definition,
                exit_code,
            });
        });

        Ok(Box::new(LocalExecution { close }))
    }

    fn subscribe_ends(&self) -> broadcast::Receiver<TaskEnd> {
        self.ends.subscribe()
    }
}
