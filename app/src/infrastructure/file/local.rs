use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use domain::error::{Error, Result};
use domain::service::{FileAccess, FileAttributes, WriteMode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite};

/// File access over a directory tree on this machine.
pub struct LocalFileAccess {
    root: PathBuf,
    root_id: String,
}

impl LocalFileAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root_id = format!("local://{}", root.display());
        Self { root, root_id }
    }
}

#[async_trait::async_trait]
impl FileAccess for LocalFileAccess {
    fn root(&self) -> &str {
        &self.root_id
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::symlink_metadata(path).await.is_ok())
    }

    async fn attributes(&self, path: &Path) -> Result<FileAttributes> {
        let meta = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|_| Error::NoSuchPath(path.display().to_string()))?;

        Ok(FileAttributes {
            is_directory: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
            size: meta.len(),
        })
    }

    async fn open_read(
        &self,
        path: &Path,
        offset: u64,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let mut file = File::open(path)
            .await
            .map_err(|_| Error::NoSuchPath(path.display().to_string()))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::new(file))
    }

    async fn open_write(
        &self,
        path: &Path,
        mode: WriteMode,
    ) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            WriteMode::Truncate => options.create(true).truncate(true),
            WriteMode::CreateNew => options.create_new(true),
            WriteMode::Append => options.append(true),
        };

        let file = options.open(path).await.map_err(Error::from)?;
        Ok(Box::new(file))
    }
}
