//! Scans a local directory for files the child process has written and
//! uploads any not yet present in the index.
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::{errors::Result, indexed::IndexedStorage, storage::Storage};

/// Scans `dir` once per call, uploading any regular file not already known
/// to `storage`.
///
/// Files are assumed immutable once they appear (the child is responsible
/// for writing them atomically, e.g. by rename-into-place); a re-scan of an
/// unchanged directory performs no writes, since every name it would find
/// is already in the index.
#[derive(Debug)]
pub struct AttachmentsScanner {
    dir: PathBuf,
}

impl AttachmentsScanner {
    /// Watch `dir` for new attachments.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being scanned.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enumerate regular files in [`Self::dir`] (not following symlinks)
    /// and upload every one not already present in `storage`'s index.
    ///
    /// Returns the names newly uploaded, in the order they were found.
    #[instrument(skip(self, storage))]
    pub async fn scan<S: Storage>(
        &self,
        storage: &IndexedStorage<S>,
    ) -> Result<Vec<String>> {
        let mut uploaded = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(uploaded),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                // Skips symlinks too: `file_type()` on a `DirEntry` does not
                // follow links, so a symlink reports as neither file nor dir.
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => {
                    warn!("skipping attachment with non-UTF-8 name");
                    continue;
                }
            };

            if storage.contains(&name) {
                continue;
            }

            let bytes = tokio::fs::read(entry.path()).await?;
            storage.write(&name, Bytes::from(bytes)).await?;

            debug!(name, "uploaded new attachment");
            uploaded.push(name);
        }

        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStorage;

    #[tokio::test]
    async fn scan_uploads_new_files_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let storage = IndexedStorage::new(MemoryStorage::new());
        let scanner = AttachmentsScanner::new(dir.path());

        let uploaded = scanner.scan(&storage).await.unwrap();
        assert_eq!(uploaded, vec!["a.txt".to_string()]);

        // second scan of an unchanged directory uploads nothing
        let uploaded = scanner.scan(&storage).await.unwrap();
        assert!(uploaded.is_empty());
    }

    #[tokio::test]
    async fn scan_picks_up_files_added_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let storage = IndexedStorage::new(MemoryStorage::new());
        let scanner = AttachmentsScanner::new(dir.path());

        assert!(scanner.scan(&storage).await.unwrap().is_empty());

        std::fs::write(dir.path().join("b.txt"), b"later").unwrap();
        assert_eq!(
            scanner.scan(&storage).await.unwrap(),
            vec!["b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn scan_of_missing_directory_is_not_an_error() {
        let storage = IndexedStorage::new(MemoryStorage::new());
        let scanner = AttachmentsScanner::new("/does/not/exist/hopefully");
        assert!(scanner.scan(&storage).await.unwrap().is_empty());
    }
}
