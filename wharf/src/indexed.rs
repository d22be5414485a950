//! Wraps a [`Storage`] with an in-memory name index and an `index.html`
//! directory listing, the way `jotta-osd::Context` wraps a `jotta::Fs`
//! without ever subclassing it.
use std::{
    collections::BTreeSet,
    sync::{atomic::AtomicBool, Mutex},
};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    errors::Result,
    storage::Storage,
};

/// Name of the human-facing directory listing. Has no role in the wire
/// protocol; it exists only for humans browsing the bucket.
pub const INDEX_NAME: &str = "index.html";

/// A [`Storage`] wrapper that remembers every name it has written or
/// deleted, and can regenerate `index.html` on demand.
#[derive(Debug)]
pub struct IndexedStorage<S> {
    inner: S,
    names: Mutex<BTreeSet<String>>,
    dirty: AtomicBool,
}

impl<S: Storage> IndexedStorage<S> {
    /// Wrap `inner`. The index starts out empty and clean.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            names: Mutex::new(BTreeSet::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Names currently known to the index, sorted.
    #[must_use]
    pub fn known_names(&self) -> Vec<String> {
        self.names.lock().unwrap().iter().cloned().collect()
    }

    /// Is `name` already known to the index?
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().unwrap().contains(name)
    }

    /// The wrapped backend. Only exposed for tests elsewhere in this
    /// crate that need to assert on raw storage contents.
    pub(crate) fn backing(&self) -> &S {
        &self.inner
    }

    /// Rewrite `index.html` if anything has changed since the last
    /// `sync`, then clear the dirty flag.
    ///
    /// Invoked once per driver tick; a no-op when nothing changed since
    /// the previous call.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<()> {
        if !self.dirty.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }

        let names = self.known_names();
        let html = render_index(&names);

        debug!(count = names.len(), "rewriting index.html");

        self.inner
            .write(INDEX_NAME, bytes::Bytes::from(html))
            .await?;

        Ok(())
    }
}

#[async_trait]
impl<S: Storage> Storage for IndexedStorage<S> {
    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.contains(name))
    }

    async fn write(&self, name: &str, bytes: bytes::Bytes) -> Result<()> {
        self.inner.write(name, bytes).await?;
        if self.names.lock().unwrap().insert(name.to_string()) {
            self.dirty.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    }

    async fn delete(&self, names: &[String]) -> Result<()> {
        self.inner.delete(names).await?;

        let mut known = self.names.lock().unwrap();
        let mut changed = false;
        for name in names {
            changed |= known.remove(name);
        }
        drop(known);

        if changed {
            self.dirty.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        Ok(())
    }
}

fn render_index(names: &[String]) -> String {
    let mut html = String::from("<!doctype html>\n<html><head><title>index</title></head><body><ul>\n");
    for name in names {
        html.push_str(&format!(
            "<li><a href=\"{name}\">{name}</a></li>\n",
            name = html_escape(name)
        ));
    }
    html.push_str("</ul></body></html>\n");
    html
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStorage;

    #[tokio::test]
    async fn sync_is_noop_when_clean() {
        let indexed = IndexedStorage::new(MemoryStorage::new());
        indexed.sync().await.unwrap(); // nothing written yet, dirty=false
        assert!(!indexed.inner.contains(INDEX_NAME));
    }

    #[tokio::test]
    async fn write_marks_dirty_and_sync_publishes_listing() {
        let indexed = IndexedStorage::new(MemoryStorage::new());
        indexed
            .write("a.txt", bytes::Bytes::from_static(b"hi"))
            .await
            .unwrap();

        indexed.sync().await.unwrap();

        let html = indexed.inner.get(INDEX_NAME).unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains("a.txt"));
    }

    #[tokio::test]
    async fn delete_only_forwards_requested_names() {
        let indexed = IndexedStorage::new(MemoryStorage::new());
        indexed
            .write("a.txt", bytes::Bytes::from_static(b"hi"))
            .await
            .unwrap();
        indexed
            .write("b.txt", bytes::Bytes::from_static(b"bye"))
            .await
            .unwrap();

        indexed.delete(&["a.txt".to_string()]).await.unwrap();

        assert!(!indexed.contains("a.txt"));
        assert!(indexed.contains("b.txt"));
        assert!(!indexed.inner.contains("a.txt"));
        assert!(indexed.inner.contains("b.txt"));
    }
}
