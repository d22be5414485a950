//! Bundled static assets (the viewer HTML and friends), compiled into the
//! binary with `rust-embed` so the driver never depends on files being
//! present on disk at runtime.
use rust_embed::RustEmbed;
use tracing::{debug, instrument};

use crate::{errors::Result, indexed::IndexedStorage, storage::Storage};

#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

/// Upload every bundled static asset not already present in `storage`.
///
/// Run once, during [`crate::uploader::ChunkedUploader::new`]'s
/// initialisation step.
#[instrument(skip(storage))]
pub async fn scan<S: Storage>(storage: &IndexedStorage<S>) -> Result<()> {
    for name in StaticAssets::iter() {
        if storage.contains(&name) {
            continue;
        }

        let Some(file) = StaticAssets::get(&name) else {
            continue;
        };

        debug!(%name, "publishing bundled static asset");
        storage
            .write(&name, bytes::Bytes::copy_from_slice(&file.data))
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStorage;

    #[tokio::test]
    async fn scan_publishes_bundled_assets_once() {
        let storage = IndexedStorage::new(MemoryStorage::new());
        scan(&storage).await.unwrap();
        assert!(storage.contains("viewer.html"));

        // a second scan does not fail or duplicate work
        scan(&storage).await.unwrap();
    }
}
