//! Process runner: one external process per job.
//!
//! Spawns through a [`ProcessPlugin`], forwards combined output to the job's
//! sink as it arrives, scans it for the warning marker, and finishes exactly
//! once with a resolved exit code.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::job::JobKey;
use crate::store::RunStore;
use crate::terminal::OutputSink;

use super::io_pump::{pump_chunks, OutputStream};
use super::scan::WarningScanner;
use super::traits::ProcessPlugin;
use super::types::SpawnArgs;

/// Upper bound on reading leftover output after the process has exited.
/// Pipes inherited by background grandchildren may otherwise stay open forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests forcible termination of a running [`ProcessRunner`].
#[derive(Clone)]
pub struct RunnerCloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl RunnerCloseHandle {
    /// No-op once the process has exited.
    pub fn close(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct ProcessRunner {
    key: JobKey,
    args: SpawnArgs,
    plugin: Arc<dyn ProcessPlugin>,
    sink: Arc<dyn OutputSink>,
    store: RunStore,
    scanner: WarningScanner,
    close_rx: watch::Receiver<bool>,
    exit_code: Option<i32>,
}

impl ProcessRunner {
    pub fn new(
        key: JobKey,
        args: SpawnArgs,
        plugin: Arc<dyn ProcessPlugin>,
        sink: Arc<dyn OutputSink>,
        store: RunStore,
    ) -> (Self, RunnerCloseHandle) {
        let (tx, close_rx) = watch::channel(false);
        let runner = Self {
            key,
            args,
            plugin,
            sink,
            store,
            scanner: WarningScanner::new(),
            close_rx,
            exit_code: None,
        };
        (runner, RunnerCloseHandle { tx: Arc::new(tx) })
    }

    /// Runs the process to completion and returns its resolved exit code.
    pub async fn run(mut self) -> i32 {
        debug!(
            target: "buildq.runner",
            job = %self.key,
            plugin = self.plugin.name(),
            command = %self.args.command_line(),
            cwd = ?self.args.cwd,
            "spawn"
        );

        let mut session = match self.plugin.spawn(&self.args).await {
            Ok(session) => session,
            Err(e) => {
                warn!(target: "buildq.runner", job = %self.key, error = %e, "process failed to start");
                let line = format!(
                    "Failed to start `{}`: {e}\r\n",
                    self.args.command_line()
                );
                self.sink.append(&line);
                return self.finish(1);
            }
        };

        let (tx, mut rx) = mpsc::channel(64);
        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = session.stdout() {
            pumps.push(pump_chunks(out, OutputStream::Stdout, tx.clone()));
        }
        if let Some(err) = session.stderr() {
            pumps.push(pump_chunks(err, OutputStream::Stderr, tx.clone()));
        }
        drop(tx);

        let mut output_open = true;
        let mut close_seen = false;

        let status = loop {
            tokio::select! {
                res = session.wait() => break res,

                chunk = rx.recv(), if output_open => match chunk {
                    Some(chunk) => self.on_output(&chunk.text),
                    None => output_open = false,
                },

                changed = self.close_rx.changed(), if !close_seen => {
                    close_seen = true;
                    if changed.is_ok() && *self.close_rx.borrow() {
                        debug!(target: "buildq.runner", job = %self.key, "close requested; killing process");
                        if let Err(e) = session.kill().await {
                            warn!(target: "buildq.runner", job = %self.key, error = %e, "kill failed");
                        }
                    }
                }
            }
        };

        if output_open {
            let drain = async {
                while let Some(chunk) = rx.recv().await {
                    self.on_output(&chunk.text);
                }
            };
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drain).await.is_err() {
                debug!(target: "buildq.runner", job = %self.key, "output still open after exit; detaching");
            }
        }

        for pump in pumps {
            if !pump.is_finished() {
                pump.abort();
                continue;
            }
            if let Ok(Err(e)) = pump.await {
                debug!(target: "buildq.runner", job = %self.key, error = %e, "output pump ended with error");
            }
        }

        let code = match status {
            Ok(code) => code.unwrap_or(0),
            Err(e) => {
                warn!(target: "buildq.runner", job = %self.key, error = %e, "wait failed");
                self.sink.append(&format!("Failed to wait for process: {e}\r\n"));
                1
            }
        };
        self.finish(code)
    }

    fn on_output(&mut self, text: &str) {
        self.sink.append(text);
        self.scanner.feed(text);
    }

    /// Only the first call has effect; later calls return the first exit code.
    fn finish(&mut self, code: i32) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        self.exit_code = Some(code);
        self.store
            .record_warning(&self.key, self.scanner.observed());
        debug!(
            target: "buildq.runner",
            job = %self.key,
            exit_code = code,
            warning = self.scanner.observed(),
            "process finished"
        );
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::traits::ProcessSession;
    use crate::util::lock;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct CollectSink(Mutex<String>);

    impl OutputSink for CollectSink {
        fn append(&self, text: &str) {
            lock(&self.0).push_str(text);
        }
    }

    struct ScriptedSession {
        stdout: Option<DuplexStream>,
        exit: Option<oneshot::Receiver<Option<i32>>>,
        killed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl ProcessSession for ScriptedSession {
        fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
            self.stdout
                .take()
                .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
        }

        fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
            None
        }

        async fn kill(&mut self) -> anyhow::Result<()> {
            *lock(&self.killed) = true;
            self.stdout = None;
            self.exit = None;
            Ok(())
        }

        async fn wait(&mut self) -> anyhow::Result<Option<i32>> {
            match self.exit.as_mut() {
                Some(rx) => Ok(rx.await.unwrap_or(None)),
                None => Ok(Some(137)),
            }
        }
    }

    struct ScriptedPlugin {
        session: Mutex<Option<ScriptedSession>>,
    }

    #[async_trait]
    impl ProcessPlugin for ScriptedPlugin {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn spawn(&self, _args: &SpawnArgs) -> anyhow::Result<Box<dyn ProcessSession>> {
            match lock(&self.session).take() {
                Some(s) => Ok(Box::new(s)),
                None => Err(anyhow::anyhow!("No such file or directory")),
            }
        }
    }

    fn scripted() -> (
        Arc<ScriptedPlugin>,
        DuplexStream,
        oneshot::Sender<Option<i32>>,
        Arc<Mutex<bool>>,
    ) {
        let (wr, rd) = tokio::io::duplex(1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let killed = Arc::new(Mutex::new(false));
        let plugin = Arc::new(ScriptedPlugin {
            session: Mutex::new(Some(ScriptedSession {
                stdout: Some(rd),
                exit: Some(exit_rx),
                killed: killed.clone(),
            })),
        });
        (plugin, wr, exit_tx, killed)
    }

    #[tokio::test]
    async fn forwards_output_and_records_split_warning() {
        let (plugin, mut wr, exit_tx, _) = scripted();
        let sink = Arc::new(CollectSink::default());
        let store = RunStore::new();
        let key = JobKey::new("app", "build");

        let (runner, _close) = ProcessRunner::new(
            key.clone(),
            SpawnArgs::new("make", vec![]),
            plugin,
            sink.clone(),
            store.clone(),
        );
        let run = tokio::spawn(runner.run());

        wr.write_all(b"warn").await.unwrap();
        wr.flush().await.unwrap();
        tokio::task::yield_now().await;
        wr.write_all(b"ing: leak detected\n").await.unwrap();
        drop(wr);
        exit_tx.send(Some(0)).unwrap();

        assert_eq!(run.await.unwrap(), 0);
        assert_eq!(lock(&sink.0).as_str(), "warning: leak detected\n");
        assert!(store.warning_observed(&key));
    }

    #[tokio::test]
    async fn missing_exit_code_is_treated_as_zero() {
        let (plugin, wr, exit_tx, _) = scripted();
        drop(wr);
        exit_tx.send(None).unwrap();

        let (runner, _close) = ProcessRunner::new(
            JobKey::new("app", "build"),
            SpawnArgs::new("make", vec![]),
            plugin,
            Arc::new(CollectSink::default()),
            RunStore::new(),
        );
        assert_eq!(runner.run().await, 0);
    }

    #[tokio::test]
    async fn spawn_failure_synthesizes_line_and_exits_one() {
        let plugin = Arc::new(ScriptedPlugin {
            session: Mutex::new(None),
        });
        let sink = Arc::new(CollectSink::default());
        let store = RunStore::new();
        let key = JobKey::new("app", "build");

        let (runner, _close) = ProcessRunner::new(
            key.clone(),
            SpawnArgs::new("no-such-tool", vec!["--all".into()]),
            plugin,
            sink.clone(),
            store.clone(),
        );

        assert_eq!(runner.run().await, 1);
        let out = lock(&sink.0).clone();
        assert!(out.starts_with("Failed to start `no-such-tool --all`"));
        assert!(out.ends_with("\r\n"));
        assert!(!store.warning_observed(&key));
    }

    #[tokio::test]
    async fn close_kills_running_process() {
        let (plugin, wr, _exit_tx, killed) = scripted();

        let (runner, close) = ProcessRunner::new(
            JobKey::new("app", "serve"),
            SpawnArgs::new("serve", vec![]),
            plugin,
            Arc::new(CollectSink::default()),
            RunStore::new(),
        );
        let run = tokio::spawn(runner.run());

        close.close();
        drop(wr);
        assert_eq!(run.await.unwrap(), 137);
        assert!(*lock(&killed));

        // Closing after exit is harmless.
        close.close();
    }
}
