//! Filesystem access used by the dispatcher and the client.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use crate::protocol::StatusCode;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error(transparent)]
    Unknown(io::Error),
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            _ => FsError::Unknown(err),
        }
    }
}

impl From<&FsError> for StatusCode {
    fn from(err: &FsError) -> Self {
        match err {
            FsError::NotFound => StatusCode::FileNotFound,
            FsError::PermissionDenied => StatusCode::BadPermissions,
            FsError::Unknown(_) => StatusCode::Unknown,
        }
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), FsError>;
    async fn delete_file(&self, path: &str) -> Result<(), FsError>;
    /// Entry names, sorted, one per line.
    async fn list_directory(&self, path: &str) -> Result<String, FsError>;
}

/// Files under a root directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFs { root: root.into() }
    }

    /// Joins `path` onto the root. Absolute paths and `..` are refused so
    /// nothing outside the root can be reached.
    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let escapes = Path::new(path).components().any(|component| {
            matches!(
                component,
                Component::Prefix(_) | Component::RootDir | Component::ParentDir
            )
        });
        if escapes {
            return Err(FsError::PermissionDenied);
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl FileStore for LocalFs {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        Ok(fs::read(self.resolve(path)?).await?)
    }

    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        Ok(fs::write(self.resolve(path)?, bytes).await?)
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        Ok(fs::remove_file(self.resolve(path)?).await?)
    }

    async fn list_directory(&self, path: &str) -> Result<String, FsError> {
        let mut entries = fs::read_dir(self.resolve(path)?).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut listing = String::new();
        for name in names {
            listing.push_str(&name);
            listing.push('\n');
        }
        Ok(listing)
    }
}
