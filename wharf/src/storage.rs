//! The narrow storage interface every backend implements.
//!
//! Modelled as a three-operation capability set (`has`, `write`, `delete`)
//! rather than a class hierarchy: [`crate::indexed::IndexedStorage`] *wraps*
//! a `Storage` instead of subclassing it, the same way `jotta-osd::Context`
//! composes a `jotta::Fs` rather than extending it.
use async_trait::async_trait;

use crate::errors::Result;

/// A write-once, delete-capable object sink.
///
/// All three operations are conceptually synchronous from the caller's point
/// of view: the returned future only resolves once the backend has
/// acknowledged the operation. A backend that retries transient failures
/// internally (the remote S3 backend does, with exponential backoff) must
/// not resolve the future until it has either succeeded or exhausted its
/// retries.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Does an object with this name exist?
    ///
    /// Bare adapters that are always used behind an [`crate::indexed::IndexedStorage`]
    /// may leave this unimplemented and return [`crate::errors::Error::HasUnsupported`]
    /// instead of guessing; silently answering `false` would be worse than
    /// failing loudly; callers must not use `has` before wrapping with `IndexedStorage`.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Write (and overwrite) an object in full.
    async fn write(&self, name: &str, bytes: bytes::Bytes) -> Result<()>;

    /// Delete a set of objects. Deleting a name that does not exist is not
    /// an error.
    async fn delete(&self, names: &[String]) -> Result<()>;
}

/// Derive a `Content-Type` from an object name's suffix, the way remote
/// backends must when issuing a `PutObject`.
///
/// ```
/// use wharf::storage::content_type_for;
///
/// assert_eq!(content_type_for("index.html"), "text/html");
/// assert_eq!(content_type_for("output.chunks"), "text/plain");
/// assert_eq!(content_type_for("output.0-6"), "text/plain");
/// assert_eq!(content_type_for("a.txt"), "text/plain");
/// ```
#[must_use]
pub fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".html") {
        "text/html"
    } else {
        "text/plain"
    }
}
