//! Local-directory [`wharf::Storage`] backend.
//!
//! Every object is a single regular file under a base directory; `write` is
//! a whole-file overwrite and `delete` removes files, tolerating ones that
//! are already gone (deletion is cleanup, not a correctness-critical
//! promise -- the consolidated object and the manifest deletions at
//! finalisation are what a reader actually depends on).
#![warn(missing_debug_implementations, clippy::pedantic)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument};
use wharf::{errors::Error as WharfError, storage::Storage};

/// Errors specific to the local backend, converted into [`wharf::Error`] at
/// the trait boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure talking to the filesystem.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Error> for WharfError {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => WharfError::Io(e),
        }
    }
}

/// A [`Storage`] backend rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Store objects under `root`, creating it if it does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    #[instrument(skip(self))]
    async fn has(&self, name: &str) -> wharf::Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(name))
            .await
            .map_err(Error::from)?)
    }

    #[instrument(skip(self, bytes))]
    async fn write(&self, name: &str, bytes: Bytes) -> wharf::Result<()> {
        let path = self.path_for(name);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::from)?;
        }

        debug!(%name, len = bytes.len(), "writing object");
        tokio::fs::write(&path, &bytes).await.map_err(Error::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, names: &[String]) -> wharf::Result<()> {
        for name in names {
            match tokio::fs::remove_file(self.path_for(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::from(e).into()),
            }
        }
        Ok(())
    }
}

/// Returns the path an object would be stored at, for callers (tests,
/// tooling) that want to inspect the raw filesystem layout directly.
#[must_use]
pub fn object_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}
