//! End-to-end scenarios from the wire-contract spec, exercised against a
//! real local-filesystem backend instead of the in-memory test double.
use std::sync::Arc;

use wharf::{indexed::IndexedStorage, uploader::ChunkedUploader, Storage};
use wharf_fs::LocalStorage;

async fn uploader(
    root: &std::path::Path,
    filename: &str,
) -> (ChunkedUploader<LocalStorage>, Arc<IndexedStorage<LocalStorage>>) {
    let storage = Arc::new(IndexedStorage::new(LocalStorage::new(root).await.unwrap()));
    let up = ChunkedUploader::new(storage.clone(), filename, "utf-8")
        .await
        .unwrap();
    (up, storage)
}

#[tokio::test]
async fn empty_stream_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let (mut up, storage) = uploader(dir.path(), "output").await;

    up.write(b"", true).await.unwrap();

    assert!(storage.has("output").await.unwrap());
    assert_eq!(
        tokio::fs::read(dir.path().join("output")).await.unwrap(),
        Vec::<u8>::new()
    );
    assert!(!dir.path().join("output.chunks").exists());
}

#[tokio::test]
async fn single_small_line_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let (mut up, _storage) = uploader(dir.path(), "output").await;

    up.write(b"hello\n", false).await.unwrap();
    up.write(b"", true).await.unwrap();

    let contents = tokio::fs::read(dir.path().join("output")).await.unwrap();
    assert_eq!(contents, b"hello\n");
    assert!(!dir.path().join("output.chunks").exists());
    assert!(!dir.path().join("output.0-6").exists());
}

#[tokio::test]
async fn attachment_ordering_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let attachments_dir = tempfile::tempdir().unwrap();

    let (mut up, storage) = uploader(dir.path(), "output").await;
    let scanner = wharf::AttachmentsScanner::new(attachments_dir.path());

    // the child writes the attachment first...
    std::fs::write(attachments_dir.path().join("a.txt"), b"attachment body").unwrap();
    scanner.scan(&storage).await.unwrap();
    assert!(dir.path().join("a.txt").exists());

    // ...and only then does a log line mentioning it get published.
    up.write(b"see a.txt\n", true).await.unwrap();

    let contents = tokio::fs::read(dir.path().join("output")).await.unwrap();
    assert_eq!(contents, b"see a.txt\n");
}
