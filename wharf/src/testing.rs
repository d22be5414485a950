//! An in-memory [`Storage`] test double.
//!
//! Exercises every invariant test in this crate (and in `wharf-fs`/`wharfd`)
//! without touching a filesystem or network, the same role `jotta-osd`'s
//! live-network `test_context` fixture plays for that crate, minus the
//! network. Never linked into a release binary: gated behind `cfg(test)`
//! or the `testing` feature.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{errors::Result, storage::Storage};

/// A `Storage` backed by a `HashMap`, guarded by a mutex.
///
/// Cloning shares the underlying map (via `Arc`), so a clone can be handed
/// to a driver loop while the test retains a handle to inspect writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryStorage {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the current bytes for `name`, if written.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    /// Whether `name` is currently present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(name)
    }

    /// All names currently present, in arbitrary order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

/// A synchronous walk of the poll protocol the bundled browser viewer
/// implements, driven directly against a [`MemoryStorage`] instead of
/// HTTP `Range` requests.
///
/// Exercises the same skip/partial-fetch discipline as the viewer: a
/// chunk already fully consumed is never re-read, and the one chunk
/// straddling the current position is read from its byte offset onward.
/// Exists so the round-trip property the wire contract promises --
/// reconstructing the stream by walking the manifest rather than just
/// concatenating every chunk object -- has something to test against.
#[derive(Debug)]
pub struct ReferenceClient {
    filename: String,
    held: u64,
}

impl ReferenceClient {
    /// A client that has read nothing of `filename` yet.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            held: 0,
        }
    }

    /// Bytes read so far.
    #[must_use]
    pub fn held(&self) -> u64 {
        self.held
    }

    /// One iteration of the poll loop.
    ///
    /// If the manifest is gone, reads the consolidated object from
    /// `held` onward. Otherwise walks the manifest's chunk sizes,
    /// skipping every chunk already fully consumed, and reads only the
    /// one chunk straddling `held` -- from its byte offset, never from
    /// the start, and bounded by the manifest's declared end in case a
    /// concurrent merge has since made the chunk object longer.
    ///
    /// Returns the newly consumed bytes, or `None` if nothing new is
    /// visible yet.
    #[must_use]
    pub fn poll_once(&mut self, storage: &MemoryStorage) -> Option<Bytes> {
        let manifest_name = format!("{}.chunks", self.filename);

        let Some(manifest) = storage.get(&manifest_name) else {
            let whole = storage.get(&self.filename)?;
            if self.held as usize >= whole.len() {
                return None;
            }
            let tail = whole.slice(self.held as usize..);
            self.held = whole.len() as u64;
            return Some(tail);
        };

        let sizes: Vec<u64> =
            serde_json::from_slice(&manifest).expect("manifest is always a JSON array of chunk sizes");

        let mut out = bytes::BytesMut::new();
        let mut start = 0u64;

        for size in sizes {
            let end = start + size;

            if self.held < end {
                let name = format!("{}.{}-{}", self.filename, start, end);

                let Some(chunk) = storage.get(&name) else {
                    // Manifest entry published just ahead of its chunk
                    // object becoming visible; stop here and retry later.
                    break;
                };

                let offset = (self.held - start) as usize;
                let wanted = (end - self.held) as usize;
                let available = chunk.len().saturating_sub(offset);
                let take = wanted.min(available);

                out.extend_from_slice(&chunk[offset..offset + take]);
                self.held += take as u64;

                if take < wanted {
                    // Chunk object shorter than the manifest promised;
                    // stop rather than miscompute the next chunk's offset.
                    break;
                }
            }

            start = end;
        }

        if out.is_empty() {
            None
        } else {
            Some(out.freeze())
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.contains(name))
    }

    async fn write(&self, name: &str, bytes: Bytes) -> Result<()> {
        self.objects.lock().unwrap().insert(name.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, names: &[String]) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        for name in names {
            objects.remove(name);
        }
        Ok(())
    }
}
