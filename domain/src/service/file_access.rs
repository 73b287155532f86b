use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct FileAttributes {
    pub is_directory: bool,
    pub is_symlink: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the file or truncate an existing one.
    Truncate,
    /// Create the file; fail if it already exists.
    CreateNew,
    /// Open an existing file for appending.
    Append,
}

/// Byte-level access to one file tree, local or remote.
///
/// The copy engine is written against this trait only; it never touches the
/// filesystem directly.
#[async_trait::async_trait]
pub trait FileAccess: Send + Sync {
    /// Stable identity of this access root. Engines are deduplicated by it.
    fn root(&self) -> &str;

    /// Resolves a possibly relative path against the access root.
    fn resolve(&self, path: &Path) -> PathBuf;

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Attributes of the path itself: symlinks are not followed.
    async fn attributes(&self, path: &Path) -> Result<FileAttributes>;

    async fn open_read(
        &self,
        path: &Path,
        offset: u64,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    async fn open_write(
        &self,
        path: &Path,
        mode: WriteMode,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>>;
}
