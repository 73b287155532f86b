mod ssh;

pub use self::ssh::SshConfig;

use std::ffi::OsStr;
use std::process::Stdio;

use domain::error::{Error, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of one command execution. A non-zero exit code is data
/// here, not an error; interpretation is left to the caller.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes single command lines, either directly on this machine or wrapped
/// in an `ssh` invocation. Transparent to callers: the same `run` works for
/// both transports.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    ssh: Option<SshConfig>,
}

impl CommandRunner {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn ssh(config: SshConfig) -> Self {
        Self { ssh: Some(config) }
    }

    pub fn is_remote(&self) -> bool {
        self.ssh.is_some()
    }

    fn command<I, S>(&self, executable: &str, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        match &self.ssh {
            None => {
                let mut command = Command::new(executable);
                command.args(args);
                command
            }
            Some(ssh) => {
                let mut command = Command::new("ssh");
                ssh.apply(&mut command);
                command.arg(executable);
                command.args(args);
                command
            }
        }
    }

    /// Runs one command to completion, feeding `stdin` and capturing both
    /// output streams. Only failure to reach the executable at all is an
    /// error; a non-zero exit lands in the returned output.
    pub async fn run<I, S>(
        &self,
        stdin: Option<&[u8]>,
        executable: &str,
        args: I,
    ) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = self.command(executable, args);
        command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(%executable, remote = self.is_remote(), "running command");
        let mut child = command
            .spawn()
            .map_err(|e| Error::ConnectionLost(format!("failed to start {executable}: {e}")))?;

        // Feed stdin while both output pipes drain, otherwise a chatty child
        // deadlocks against a full pipe.
        let writer = stdin.and_then(|bytes| {
            let mut sink = child.stdin.take()?;
            let bytes = bytes.to_vec();
            Some(tokio::spawn(async move {
                let _ = sink.write_all(&bytes).await;
                let _ = sink.shutdown().await;
            }))
        });

        let output = child.wait_with_output().await.map_err(Error::from)?;
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`run`](Self::run), but a non-zero exit becomes `CommandFailed`
    /// carrying the exit code and both captured streams.
    pub async fn run_checked<I, S>(
        &self,
        stdin: Option<&[u8]>,
        executable: &str,
        args: I,
    ) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(stdin, executable, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::CommandFailed {
                command: executable.to_owned(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}
