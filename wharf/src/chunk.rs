//! The chunk list and the "2048" merge rule.
//!
//! This is the logarithmic layout at the heart of the protocol: blocks
//! arrive one at a time and are folded into an ever-shrinking list of
//! chunks whose block-counts are strictly decreasing powers of two, the
//! same shape `jotta-osd::object::aligned_chunked_byte_range` assumes when
//! it walks fixed-size chunk ranges, except here the chunk sizes are
//! themselves a product of the merge history rather than a constant.
use bytes::Bytes;
use derive_more::Display;

/// An immutable byte payload produced by one flush.
pub type Block = Bytes;

/// A named, half-open byte range `[start, end)` within the flushed prefix.
///
/// Displays as `{start}-{end}`, the literal suffix appended to
/// `{filename}.` to form a chunk object's name.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{}-{}", start, end)]
pub struct ChunkRange {
    /// Absolute start offset, inclusive.
    pub start: u64,
    /// Absolute end offset, exclusive.
    pub end: u64,
}

impl ChunkRange {
    /// Number of bytes spanned by this range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range is empty (`start == end`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The object name suffix for this range, e.g. `"0-6"`.
    #[must_use]
    pub fn suffix(&self) -> String {
        self.to_string()
    }
}

/// An ordered, non-empty list of [`Block`]s, published as a single
/// immutable object once written.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    blocks: Vec<Block>,
}

impl Chunk {
    fn singleton(block: Block) -> Self {
        Self {
            blocks: vec![block],
        }
    }

    /// Number of blocks folded into this chunk. Merge eligibility is
    /// decided on this count, never on byte size.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total byte length of this chunk.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.blocks.iter().map(|b| b.len() as u64).sum()
    }

    /// Concatenate this chunk's blocks into a single contiguous buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        if self.blocks.len() == 1 {
            return self.blocks[0].clone();
        }

        let mut buf = bytes::BytesMut::with_capacity(self.byte_len() as usize);
        for block in &self.blocks {
            buf.extend_from_slice(block);
        }
        buf.freeze()
    }

    fn merge(self, other: Self) -> Self {
        let mut blocks = self.blocks;
        blocks.extend(other.blocks);
        Self { blocks }
    }
}

/// The uploader's in-memory chunk list.
///
/// Invariant maintained after every [`ChunkList::append_block`]: block
/// counts are strictly decreasing from front to back, and each is a power
/// of two (the "2048 game" shape). This bounds the list length by
/// `⌊log2 n⌋ + 1` for `n` flushed blocks.
#[derive(Debug, Clone, Default)]
pub struct ChunkList {
    chunks: Vec<Chunk>,
}

impl ChunkList {
    /// An empty chunk list, as it exists before the first flush.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently held. Bounded by `⌊log2 n⌋ + 1`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Byte sizes of every chunk, in order -- exactly the manifest body.
    #[must_use]
    pub fn sizes(&self) -> Vec<u64> {
        self.chunks.iter().map(Chunk::byte_len).collect()
    }

    /// The absolute byte range of the last chunk, if any.
    #[must_use]
    pub fn last_range(&self) -> Option<ChunkRange> {
        let end: u64 = self.chunks.iter().map(Chunk::byte_len).sum();
        let last = self.chunks.last()?;
        Some(ChunkRange {
            start: end - last.byte_len(),
            end,
        })
    }

    /// The raw bytes of the last chunk, the one that was just (re)published
    /// by the most recent [`Self::append_block`] call.
    #[must_use]
    pub fn last_chunk_bytes(&self) -> Option<Bytes> {
        self.chunks.last().map(Chunk::to_bytes)
    }

    /// Concatenate every block of every chunk, in order -- the full
    /// flushed prefix.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        for chunk in &self.chunks {
            buf.extend_from_slice(&chunk.to_bytes());
        }
        buf.freeze()
    }

    /// Append a new singleton chunk and repeatedly merge the last two
    /// chunks while they hold equal block counts.
    ///
    /// Returns `true` if the last chunk's range changed as a result (it
    /// always does, since a new chunk was just appended), letting the
    /// caller know it must republish the last chunk object.
    pub fn append_block(&mut self, block: Block) {
        self.chunks.push(Chunk::singleton(block));

        while self.chunks.len() >= 2 {
            let n = self.chunks.len();
            if self.chunks[n - 1].block_count() == self.chunks[n - 2].block_count() {
                let b = self.chunks.pop().unwrap();
                let a = self.chunks.pop().unwrap();
                self.chunks.push(a.merge(b));
            } else {
                break;
            }
        }
    }
}
