//! The 1-second-tick main loop: poll the child, read its output, scan
//! attachments, flush into the uploader, and republish the index.
use std::{path::Path, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::info;
use wharf::{AttachmentsScanner, ChunkedUploader, IndexedStorage, Storage};

use crate::procio::ChildIo;

/// Name of the environment variable the child is told the attachments
/// directory under.
pub const ATTACHMENTS_DIR_ENV: &str = "STREAMUP_ATTACHMENTS_DIR";

/// A single non-blocking read never asks for more than this many bytes,
/// matching the enlarged pipe buffer the driver requests from the kernel.
const READ_CHUNK: usize = 1 << 20;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum Error {
    #[error("reading child output failed: {0}")]
    ChildIo(#[from] std::io::Error),

    #[error("storage operation failed: {0}")]
    Storage(#[from] wharf::Error),
}

/// Runs the child-process-to-store pipeline to completion and returns the
/// process exit status to propagate.
pub struct Driver<S> {
    child_io: ChildIo,
    uploader: ChunkedUploader<S>,
    storage: Arc<IndexedStorage<S>>,
    scanner: AttachmentsScanner,
}

impl<S: Storage> Driver<S> {
    pub fn new(
        child_io: ChildIo,
        uploader: ChunkedUploader<S>,
        storage: Arc<IndexedStorage<S>>,
        attachments_dir: &Path,
    ) -> Self {
        Self {
            child_io,
            uploader,
            storage,
            scanner: AttachmentsScanner::new(attachments_dir),
        }
    }

    /// Drive the child to completion, returning its exit code (or a
    /// synthetic failure code if it was terminated by a signal).
    pub async fn run(mut self) -> Result<i32, Error> {
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            tokio::time::sleep(TICK).await;

            let exited = self.child_io.child.try_wait()?;

            let n = self.child_io.try_read(&mut buf)?;

            let uploaded = self.scanner.scan(&self.storage).await?;
            if !uploaded.is_empty() {
                info!(count = uploaded.len(), "uploaded new attachments");
            }

            self.uploader.write(&buf[..n], exited.is_some()).await?;
            self.storage.sync().await?;

            if let Some(status) = exited {
                let code = status.code().unwrap_or(1);
                info!(code, "child exited, stream finalised");
                return Ok(code);
            }
        }
    }
}

impl<S> std::fmt::Debug for Driver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}
