//! The logarithmic chunked-upload protocol: turns an unbounded byte stream
//! into a sequence of immutable, content-addressed chunk objects plus a
//! small manifest, so a polling client can catch up on O(log n) requests
//! and O(n log n) total bytes.
//!
//! This crate is backend-agnostic: it knows nothing about local disks or
//! S3, only the three-method [`storage::Storage`] capability set. See
//! `wharf-fs` and `wharf-s3` for concrete backends, and `wharfd` for the
//! driver binary that spawns a child process and wires everything
//! together.
#![warn(missing_debug_implementations, clippy::pedantic)]

pub mod assets;
pub mod attachments;
pub mod chunk;
pub mod errors;
pub mod indexed;
pub mod storage;
pub mod uploader;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use attachments::AttachmentsScanner;
pub use errors::{Error, Result};
pub use indexed::IndexedStorage;
pub use storage::Storage;
pub use uploader::ChunkedUploader;
