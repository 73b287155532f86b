use std::path::PathBuf;

use domain::model::vo::Credential;
use tokio::process::Command;

/// Where and how to hop through the OpenSSH client.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub username_host: String,
    pub port: String,
    pub keyfile: Option<PathBuf>,
}

impl SshConfig {
    pub fn new(host: &str, port: u16, credential: &Credential) -> Self {
        let username_host = match &credential.username {
            Some(username) => format!("{username}@{host}"),
            None => host.to_owned(),
        };

        Self {
            username_host,
            port: port.to_string(),
            keyfile: credential.keyfile.clone(),
        }
    }

    /// Adds the hop arguments up to and including `user@host`; the remote
    /// command line follows.
    pub(super) fn apply(&self, command: &mut Command) {
        // BatchMode: never prompt, fail instead. Credential handling beyond a
        // key file belongs to the caller's ssh agent setup.
        command.args(["-o", "BatchMode=yes", "-p", &self.port]);
        if let Some(keyfile) = &self.keyfile {
            command.arg("-i").arg(keyfile);
        }
        command.arg(&self.username_host);
    }
}
