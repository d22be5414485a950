//! The chunked uploader: the logarithmic merge discipline plus the
//! decode/flush/finalise state machine that drives it.
use std::{
    mem,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use encoding_rs::Encoding;
use tracing::{debug, info, instrument};

use crate::{
    chunk::ChunkList,
    errors::{DecodeError, Result},
    indexed::IndexedStorage,
    storage::Storage,
};

/// Flush a block once pending bytes reach this size, even before the time
/// limit elapses.
pub const SIZE_LIMIT: usize = 1_000_000;

/// Flush whatever is pending once this much time has passed since the
/// first byte of the pending block arrived.
pub const TIME_LIMIT: Duration = Duration::from_secs(10);

/// Consumes a stream of raw byte blocks from the child process and
/// maintains the published chunk objects and manifest.
///
/// Owns the chunk list and the pending-block buffer exclusively; the
/// wrapped [`IndexedStorage`] owns the bytes once they are handed off via
/// `write`.
pub struct ChunkedUploader<S> {
    storage: Arc<IndexedStorage<S>>,
    filename: String,
    decoder: encoding_rs::Decoder,
    pending: Vec<u8>,
    chunks: ChunkList,
    send_at: Option<Instant>,
    suffixes: std::collections::BTreeSet<String>,
}

impl<S: Storage> ChunkedUploader<S> {
    /// Initialise a new stream named `filename` on `storage`.
    ///
    /// Writes the empty manifest `[]` unconditionally -- redundant if the
    /// first block arrives immediately, but required so a very-early
    /// client polling `{filename}.chunks` never sees a 404 before the
    /// stream has truly finished -- and then publishes any bundled static
    /// assets (the viewer page).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownEncoding`] if `encoding_label` does not
    /// name an encoding `encoding_rs` recognises, and forwards any storage
    /// error encountered while writing the initial manifest.
    pub async fn new(
        storage: Arc<IndexedStorage<S>>,
        filename: impl Into<String>,
        encoding_label: &str,
    ) -> std::result::Result<Self, InitError> {
        let encoding = Encoding::for_label(encoding_label.as_bytes())
            .ok_or_else(|| InitError::Decode(DecodeError::UnknownEncoding(encoding_label.into())))?;

        let filename = filename.into();

        let mut this = Self {
            storage,
            filename,
            decoder: encoding.new_decoder(),
            pending: Vec::new(),
            chunks: ChunkList::new(),
            send_at: None,
            suffixes: std::collections::BTreeSet::new(),
        };

        this.write_manifest().await.map_err(InitError::Storage)?;
        crate::assets::scan(&this.storage)
            .await
            .map_err(InitError::Storage)?;

        Ok(this)
    }

    fn manifest_name(&self) -> String {
        format!("{}.chunks", self.filename)
    }

    fn chunk_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.filename, suffix)
    }

    /// Decode `data`, and either flush it into a new chunk (on a size/time
    /// threshold or finalisation) or leave it pending.
    ///
    /// `final` signals that `data` is the last block the child will ever
    /// produce (end of stream, or the child exited). After a call with
    /// `final = true`, the stream is finalised: the consolidated object is
    /// written and every chunk object plus the manifest is deleted.
    #[instrument(skip(self, data))]
    pub async fn write(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        self.decode(data, is_final);

        if is_final {
            return self.finalize().await;
        }

        if self.pending.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let send_at = *self.send_at.get_or_insert(now + TIME_LIMIT);

        if now >= send_at || self.pending.len() >= SIZE_LIMIT {
            self.append_block().await?;
        }

        Ok(())
    }

    fn decode(&mut self, data: &[u8], is_final: bool) {
        let mut input = data;
        loop {
            let mut out = String::with_capacity(input.len() * 4 + 32);
            let (result, read, _had_errors) =
                self.decoder.decode_to_string(input, &mut out, is_final);
            self.pending.extend_from_slice(out.as_bytes());
            input = &input[read..];

            match result {
                encoding_rs::CoderResult::InputEmpty => break,
                // `out` was too small for the remaining input; loop again
                // with a fresh buffer to drain the rest.
                encoding_rs::CoderResult::OutputFull => continue,
            }
        }
    }

    /// Promote the pending buffer into a new block, running the "2048"
    /// merge and republishing the (possibly newly-merged) last chunk plus
    /// the manifest.
    ///
    /// The chunk object is written -- and acknowledged -- strictly before
    /// the manifest that names it, so a client never observes a manifest
    /// entry for an object that does not yet exist.
    #[instrument(skip(self))]
    async fn append_block(&mut self) -> Result<()> {
        let block = Bytes::from(mem::take(&mut self.pending));
        self.chunks.append_block(block);
        self.send_at = None;

        let range = self
            .chunks
            .last_range()
            .expect("a block was just appended, so a last chunk exists");
        let bytes = self
            .chunks
            .last_chunk_bytes()
            .expect("a block was just appended, so a last chunk exists");

        let suffix = range.suffix();
        debug!(suffix = %suffix, len = bytes.len(), "publishing chunk");

        self.storage.write(&self.chunk_name(&suffix), bytes).await?;
        self.suffixes.insert(suffix);

        self.write_manifest().await
    }

    async fn write_manifest(&self) -> Result<()> {
        let sizes = self.chunks.sizes();
        let body = serde_json::to_vec(&sizes).expect("Vec<u64> always serialises");
        self.storage.write(&self.manifest_name(), Bytes::from(body)).await
    }

    #[instrument(skip(self))]
    async fn finalize(&mut self) -> Result<()> {
        let mut whole = self.chunks.to_bytes().to_vec();
        whole.extend_from_slice(&self.pending);
        self.pending.clear();

        info!(bytes = whole.len(), "finalising stream");

        self.storage.write(&self.filename, Bytes::from(whole)).await?;

        let mut to_delete: Vec<String> = self
            .suffixes
            .iter()
            .map(|suffix| self.chunk_name(suffix))
            .collect();
        to_delete.push(self.manifest_name());

        self.storage.delete(&to_delete).await
    }
}

/// Errors that can occur while constructing a [`ChunkedUploader`].
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// `encoding_label` did not name a recognised encoding.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Writing the initial manifest (or static assets) failed.
    #[error(transparent)]
    Storage(#[from] crate::errors::Error),
}
