/// Failures raised by schedulers, file access and the copy engine.
///
/// The enum is `Clone` because status snapshots carry the failure that
/// produced them; a background poller stores the error once and every later
/// status query hands out a copy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("incomplete job description: {0}")]
    IncompleteJobDescription(String),

    #[error("invalid job description: {0}")]
    InvalidJobDescription(String),

    #[error("no such job: {0}")]
    NoSuchJob(String),

    #[error("no such queue: {0}")]
    NoSuchQueue(String),

    #[error("no such scheduler: {0}")]
    NoSuchScheduler(String),

    #[error("no such copy: {0}")]
    NoSuchCopy(String),

    #[error("no such path: {0}")]
    NoSuchPath(String),

    #[error("path already exists: {0}")]
    PathAlreadyExists(String),

    #[error("illegal source path: {0}")]
    IllegalSourcePath(String),

    #[error("illegal target path: {0}")]
    IllegalTargetPath(String),

    #[error("invalid resume target: {0}")]
    InvalidResumeTarget(String),

    #[error("invalid location {location}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("invalid value for property {key}: {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("{command} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unexpected end of file: {0}")]
    EndOfFile(String),

    #[error("{0} killed by user")]
    Killed(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let text = e.to_string();
        match e.kind() {
            ErrorKind::NotFound => Error::NoSuchPath(text),
            ErrorKind::PermissionDenied => Error::PermissionDenied(text),
            ErrorKind::AlreadyExists => Error::PathAlreadyExists(text),
            ErrorKind::UnexpectedEof => Error::EndOfFile(text),
            _ => Error::Io(text),
        }
    }
}
