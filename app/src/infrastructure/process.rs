use std::path::Path;
use std::process::Stdio;

use domain::error::{Error, Result};
use domain::model::vo::{JobDescription, StdInKind};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

/// Starts the OS process described by an already verified job description.
///
/// Stdout and stderr go to the redirection targets (discarded when unset).
/// Stdin content is fed by a spawned writer that closes the child's input
/// once fully written, so callers polling the handle never block on it.
pub async fn launch(description: &JobDescription) -> Result<ProcessHandle> {
    let mut command = Command::new(&description.executable);
    command.args(&description.arguments);
    command.envs(&description.environment);

    if let Some(dir) = &description.working_directory {
        let is_dir = tokio::fs::metadata(dir).await.map(|m| m.is_dir());
        if !is_dir.unwrap_or(false) {
            return Err(Error::NoSuchPath(format!(
                "working directory {} does not exist",
                dir.display()
            )));
        }
        command.current_dir(dir);
    }

    command.stdout(redirect(description.stdout.as_deref()).await?);
    command.stderr(redirect(description.stderr.as_deref()).await?);
    command.stdin(if description.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NoSuchPath(format!("{}: {e}", description.executable))
        }
        _ => Error::from(e),
    })?;
    tracing::debug!(executable = %description.executable, pid = child.id(), "process started");

    if let Some(kind) = description.stdin.clone() {
        if let Some(mut sink) = child.stdin.take() {
            tokio::spawn(async move {
                let result = match kind {
                    StdInKind::Text { text } => sink.write_all(text.as_bytes()).await,
                    StdInKind::File { path } => match tokio::fs::File::open(&path).await {
                        Ok(mut file) => tokio::io::copy(&mut file, &mut sink).await.map(|_| ()),
                        Err(e) => Err(e),
                    },
                };
                if let Err(e) = result {
                    tracing::warn!("stdin writer failed: {e}");
                }
                let _ = sink.shutdown().await;
            });
        }
    }

    Ok(ProcessHandle { child })
}

async fn redirect(path: Option<&Path>) -> Result<Stdio> {
    match path {
        None => Ok(Stdio::null()),
        Some(path) => {
            let file = tokio::fs::File::create(path).await?;
            Ok(Stdio::from(file.into_std().await))
        }
    }
}

pub struct ProcessHandle {
    child: Child,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit code if the process has finished, without blocking. Exits caused
    /// by a signal report `-1`.
    pub fn try_exit_code(&mut self) -> Result<Option<i32>> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(status.code().unwrap_or(-1))),
            Ok(None) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Force-kills the process and reaps it.
    pub async fn kill(&mut self) -> Result<()> {
        tracing::debug!(pid = self.child.id(), "killing process");
        self.child.kill().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("gridgate-process-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    async fn wait_exit(handle: &mut ProcessHandle) -> i32 {
        for _ in 0..500 {
            if let Some(code) = handle.try_exit_code().unwrap() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("process did not exit in time");
    }

    #[tokio::test]
    async fn redirects_stdout_and_reports_exit_code() {
        let out = scratch("stdout.txt");
        let description = JobDescription::builder()
            .executable("/bin/sh")
            .arguments(vec!["-c".into(), "echo hello".into()])
            .stdout(out.clone())
            .build();

        let mut handle = launch(&description).await.unwrap();
        assert_eq!(wait_exit(&mut handle).await, 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn feeds_stdin_text_and_closes_it() {
        let out = scratch("cat.txt");
        let description = JobDescription::builder()
            .executable("/bin/cat")
            .stdin(StdInKind::Text {
                text: "from stdin".to_owned(),
            })
            .stdout(out.clone())
            .build();

        let mut handle = launch(&description).await.unwrap();
        // cat only exits once its stdin is closed by the writer.
        assert_eq!(wait_exit(&mut handle).await, 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "from stdin");
    }

    #[tokio::test]
    async fn kill_stops_a_running_process() {
        let description = JobDescription::builder()
            .executable("/bin/sleep")
            .arguments(vec!["60".into()])
            .build();

        let mut handle = launch(&description).await.unwrap();
        assert_eq!(handle.try_exit_code().unwrap(), None);
        handle.kill().await.unwrap();
        assert!(handle.try_exit_code().unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let description = JobDescription::builder().executable("/no/such/binary").build();
        assert!(matches!(
            launch(&description).await,
            Err(Error::NoSuchPath(_))
        ));
    }

    #[tokio::test]
    async fn missing_working_directory_is_reported() {
        let description = JobDescription::builder()
            .executable("/bin/true")
            .working_directory("/no/such/dir")
            .build();
        assert!(matches!(
            launch(&description).await,
            Err(Error::NoSuchPath(_))
        ));
    }
}
