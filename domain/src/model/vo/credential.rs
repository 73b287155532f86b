use std::path::PathBuf;

/// Login material for a remote endpoint. Management (agents, keyrings,
/// passphrase prompting) is outside this crate; adaptors only read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: Option<String>,
    pub keyfile: Option<PathBuf>,
}

impl Credential {
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            keyfile: None,
        }
    }
}
