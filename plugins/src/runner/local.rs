use std::io;
use std::process::{ExitStatus, Stdio};

use anyhow::Result;
use async_trait::async_trait;
use buildq_core::error::RunnerError;
use buildq_core::runner::{ProcessPlugin, ProcessSession, SpawnArgs};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// Spawns commands as local child processes with piped output.
///
/// On Windows every command goes through `cmd /C` so that batch wrappers
/// (`gradlew.bat`, `npm.cmd`, ...) resolve; elsewhere only when `shell` is set.
pub struct LocalProcessPlugin {
    shell: bool,
}

impl LocalProcessPlugin {
    pub fn new(shell: bool) -> Self {
        Self { shell }
    }

    fn command(&self, args: &SpawnArgs) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&args.cmd).args(&args.args);
            c
        } else if self.shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(args.command_line());
            c
        } else {
            let mut c = Command::new(&args.cmd);
            c.args(&args.args);
            c
        };
        if let Some(cwd) = &args.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for LocalProcessPlugin {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl ProcessPlugin for LocalProcessPlugin {
    fn name(&self) -> &str {
        "local"
    }

    async fn spawn(&self, args: &SpawnArgs) -> Result<Box<dyn ProcessSession>> {
        let child = self
            .command(args)
            .spawn()
            .map_err(|e| RunnerError::Spawn(e.to_string()))?;
        Ok(Box::new(LocalProcessSession { child }))
    }
}

struct LocalProcessSession {
    child: Child,
}

#[async_trait]
impl ProcessSession for LocalProcessSession {
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn kill(&mut self) -> Result<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(exit_code(status))
    }
}

/// Signal terminations follow the shell convention `128 + signal`.
fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(rd: Option<Box<dyn AsyncRead + Unpin + Send>>) -> String {
        let mut out = String::new();
        if let Some(mut rd) = rd {
            rd.read_to_string(&mut out).await.unwrap();
        }
        out
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let plugin = LocalProcessPlugin::new(true);
        let args = SpawnArgs::new("echo out; echo err >&2; exit 3", vec![]);
        let mut session = plugin.spawn(&args).await.unwrap();

        let (out, err) = tokio::join!(read_all(session.stdout()), read_all(session.stderr()));
        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
        assert_eq!(session.wait().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = LocalProcessPlugin::default();
        let args = SpawnArgs::new("pwd", vec![]).with_cwd(dir.path());
        let mut session = plugin.spawn(&args).await.unwrap();

        let out = read_all(session.stdout()).await;
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(out.trim()).canonicalize().unwrap(),
            expected
        );
        assert_eq!(session.wait().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn killed_process_reports_signal_exit() {
        let plugin = LocalProcessPlugin::new(true);
        let mut session = plugin
            .spawn(&SpawnArgs::new("sleep 30", vec![]))
            .await
            .unwrap();
        session.kill().await.unwrap();
        assert_eq!(session.wait().await.unwrap(), Some(128 + 9));
        session.kill().await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let plugin = LocalProcessPlugin::default();
        let err = plugin
            .spawn(&SpawnArgs::new("buildq-definitely-not-a-program", vec![]))
            .await
            .err()
            .expect("spawn must fail");
        assert!(err.to_string().contains("spawn failed"), "{err}");
    }
}
