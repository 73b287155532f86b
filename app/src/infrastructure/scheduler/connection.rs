//! Location handling shared by the command-line schedulers.
//!
//! A location is `scheme://` for the machine the agent runs on, or
//! `scheme://[user@]host[:port]` to reach the backend's tools over ssh.
//! Nothing else is allowed in the url; paths, queries and fragments are
//! rejected up front so a typo fails at creation instead of at first use.

use std::ffi::OsStr;

use domain::error::{Error, Result};
use domain::model::vo::Credential;
use url::Url;

use crate::infrastructure::command::{CommandOutput, CommandRunner, SshConfig};

pub const DEFAULT_SSH_PORT: u16 = 22;

pub struct SchedulerConnection {
    location: String,
    runner: CommandRunner,
}

impl SchedulerConnection {
    pub fn open(
        schemes: &'static [&'static str],
        location: &str,
        credential: &Credential,
    ) -> Result<Self> {
        let url = Url::parse(location)
            .map_err(|e| invalid(location, format!("not a valid url: {e}")))?;

        if !schemes.contains(&url.scheme()) {
            return Err(invalid(
                location,
                format!("unsupported scheme {:?}, expected one of {schemes:?}", url.scheme()),
            ));
        }
        if !matches!(url.path(), "" | "/") {
            return Err(invalid(location, "a path is not allowed".to_owned()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid(location, "queries and fragments are not allowed".to_owned()));
        }
        if url.username() != "" {
            return Err(invalid(
                location,
                "pass the username through the credential, not the url".to_owned(),
            ));
        }

        let runner = match url.host_str() {
            None | Some("") => CommandRunner::local(),
            Some(host) => {
                let port = url.port().unwrap_or(DEFAULT_SSH_PORT);
                CommandRunner::ssh(SshConfig::new(host, port, credential))
            }
        };

        Ok(Self {
            location: location.to_owned(),
            runner,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_remote(&self) -> bool {
        self.runner.is_remote()
    }

    pub async fn run<I, S>(&self, stdin: Option<&[u8]>, executable: &str, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.runner.run(stdin, executable, args).await
    }

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
        self.runner.run_checked(stdin, executable, args).await
    }

    /// Probes that a directory exists where the backend's tools run, local or
    /// remote alike.
    pub async fn check_directory(&self, path: &str) -> Result<()> {
        let output = self.run(None, "test", ["-d", path]).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::NoSuchPath(path.to_owned()))
        }
    }
}

fn invalid(location: &str, reason: String) -> Error {
    Error::InvalidLocation {
        location: location.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: &[&str] = &["slurm"];

    #[test]
    fn bare_scheme_runs_locally() {
        let conn =
            SchedulerConnection::open(SCHEMES, "slurm://", &Credential::default()).unwrap();
        assert!(!conn.is_remote());
        assert_eq!(conn.location(), "slurm://");
    }

    #[test]
    fn host_switches_to_ssh() {
        let credential = Credential::with_username("alice");
        let conn =
            SchedulerConnection::open(SCHEMES, "slurm://login.cluster:2222", &credential).unwrap();
        assert!(conn.is_remote());
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        let result = SchedulerConnection::open(SCHEMES, "torque://head", &Credential::default());
        assert!(matches!(result, Err(Error::InvalidLocation { .. })));
    }

    #[test]
    fn path_query_and_userinfo_are_rejected() {
        for location in [
            "slurm://head/queue",
            "slurm://head?opt=1",
            "slurm://alice@head",
        ] {
            let result = SchedulerConnection::open(SCHEMES, location, &Credential::default());
            assert!(
                matches!(result, Err(Error::InvalidLocation { .. })),
                "{location} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn check_directory_distinguishes_files_from_directories() {
        let conn =
            SchedulerConnection::open(SCHEMES, "slurm://", &Credential::default()).unwrap();

        conn.check_directory("/tmp").await.unwrap();
        assert!(matches!(
            conn.check_directory("/no/such/dir").await,
            Err(Error::NoSuchPath(_))
        ));
    }
}
