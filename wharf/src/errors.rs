//! Error types shared by the chunking protocol and its storage backends.
use thiserror::Error;

/// Errors raised by [`crate::storage::Storage`] implementations.
///
/// Backends (`wharf-fs`, `wharf-s3`) wrap their own lower-level error types
/// behind this enum so that [`crate::uploader::ChunkedUploader`] and
/// [`crate::indexed::IndexedStorage`] never need to know which backend is in
/// use.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying storage operation failed and all retries (if any)
    /// were exhausted.
    #[error("storage backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// `has` was called on a bare adapter that does not track membership
    /// and is not wrapped by an [`crate::indexed::IndexedStorage`].
    #[error("has() is not supported by this storage adapter without an IndexedStorage wrapper")]
    HasUnsupported,

    /// The name is not valid for this storage backend.
    #[error("invalid object name: {0}")]
    InvalidName(String),

    /// Local filesystem I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding child output into UTF-8.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The configured encoding label is not recognised.
    #[error("unknown encoding label: {0}")]
    UnknownEncoding(String),
}

/// Result alias used throughout `wharf`.
pub type Result<T> = core::result::Result<T, Error>;
