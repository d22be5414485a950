//! Remote [`wharf::Storage`] backend for any S3-compatible object store.
//!
//! Every `write` issues a `PutObject` with a public-read ACL (configurable,
//! since some S3-compatible backends reject the ACL header outright when
//! Object Ownership is bucket-owner-enforced) and a `Content-Type` derived
//! from the object name's suffix. Transient failures are retried by the
//! underlying SDK's own retry classifier; this backend just configures it
//! to the ten-attempt, doubling-from-one-second policy this system's wire
//! contract assumes.
#![warn(missing_debug_implementations, clippy::pedantic)]

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{config::retry::RetryConfig, primitives::ByteStream, types::ObjectCannedAcl};
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument};
use wharf::{
    errors::Error as WharfError,
    storage::{content_type_for, Storage},
};

/// The client-side mirror of the retry policy described for storage
/// adapters: ten attempts, doubling delay starting at one second.
const MAX_ATTEMPTS: u32 = 10;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Errors specific to the S3 backend, converted into [`wharf::Error`] at the
/// trait boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// `PutObject` failed after retries were exhausted, or failed with a
    /// non-retryable (4xx) response.
    #[error("s3 put_object failed: {0}")]
    Put(String),

    /// `DeleteObjects`/`DeleteObject` failed.
    #[error("s3 delete failed: {0}")]
    Delete(String),

    /// `HeadObject` (used for `has`) failed for a reason other than "not
    /// found".
    #[error("s3 head_object failed: {0}")]
    Head(String),
}

impl From<Error> for WharfError {
    fn from(e: Error) -> Self {
        WharfError::Backend(Box::new(e))
    }
}

impl std::error::Error for Error {}

/// An S3-compatible [`Storage`] backend.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    /// Prepended to every object name, so multiple streams can share a
    /// bucket the way `jotta-osd` namespaces buckets under one root.
    prefix: String,
    /// Whether to request a public-read ACL on every write. Disable for
    /// backends that reject the ACL header.
    public_read: bool,
}

impl S3Storage {
    /// Build a backend from an already-configured SDK client.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: String::new(),
            public_read: true,
        }
    }

    /// Load credentials and region from the standard AWS environment
    /// (environment variables, shared config/credentials files, IMDS), the
    /// way `aws-config`'s `BehaviorVersion::latest()` resolver does for
    /// every other crate in this ecosystem that talks to S3.
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .retry_config(retry_config())
            .load()
            .await;

        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }

    /// Namespace every object name under `prefix/`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Disable the `public-read` ACL on writes (for backends that reject
    /// it).
    #[must_use]
    pub fn without_public_read(mut self) -> Self {
        self.public_read = false;
        self
    }

    fn key_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    #[instrument(skip(self))]
    async fn has(&self, name: &str) -> wharf::Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key_for(name))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found);

                if not_found {
                    Ok(false)
                } else {
                    Err(Error::Head(e.to_string()).into())
                }
            }
        }
    }

    #[instrument(skip(self, bytes))]
    async fn write(&self, name: &str, bytes: Bytes) -> wharf::Result<()> {
        let content_type = content_type_for(name);

        debug!(%name, len = bytes.len(), content_type, "putting object");

        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key_for(name))
            .content_type(content_type)
            .body(ByteStream::from(bytes));

        if self.public_read {
            req = req.acl(ObjectCannedAcl::PublicRead);
        }

        req.send().await.map_err(|e| Error::Put(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, names: &[String]) -> wharf::Result<()> {
        for name in names {
            match self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(self.key_for(name))
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) => return Err(Error::Delete(e.to_string()).into()),
            }
        }
        Ok(())
    }
}

/// The retry backoff this backend configures its client with, exposed so
/// callers assembling their own `aws_config::SdkConfig` can match it.
#[must_use]
pub fn retry_config() -> RetryConfig {
    RetryConfig::standard()
        .with_max_attempts(MAX_ATTEMPTS)
        .with_initial_backoff(INITIAL_BACKOFF)
}
