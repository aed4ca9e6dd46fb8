//! Object-store abstraction consumed by the file services.
//!
//! The services only ever talk to an [`ObjectStore`]: bucket lifecycle, single
//! object put/get/head/delete, prefix listing and pre-signed URL issuance. Three
//! backends implement it:
//!
//! - [`local::LocalStore`]: SQLite metadata + on-disk payloads.
//! - [`s3::S3Store`]: any S3-compatible endpoint through `aws-sdk-s3`.
//! - [`memory::MemoryStore`]: process-local map, used in development and tests.

pub mod local;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::{collections::HashMap, fmt, io, time::Duration};
use thiserror::Error;

/// Readable byte stream flowing into or out of the store.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Raw metadata tags as persisted next to an object.
pub type MetadataTags = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("failed to presign `{key}`: {reason}")]
    Presign { key: String, reason: String },
    #[error("object store request failed: {0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Receives transfer progress for a single `put_object` call.
///
/// Values are percentages in `0..=100`, non-decreasing, ending with 100 on
/// success.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

/// Sink for uploads nobody is watching.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8) {}
}

/// Integer percentage of `sent` over `total`, floored and capped at 100.
/// An empty body counts as complete.
pub fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (sent as u128 * 100 / total as u128).min(100);
    pct as u8
}

/// Options attached to a single `put_object`.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: String,
    pub metadata: MetadataTags,
    /// Total body length when the caller knows it; drives progress reporting.
    pub content_length: Option<u64>,
}

/// Everything known about an object except its payload.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub key: String,
    pub content_type: String,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    pub metadata: MetadataTags,
}

/// An object read back from the store.
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    pub metadata: MetadataTags,
    pub body: ByteStream,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("last_modified", &self.last_modified)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Scheme a pre-signed URL is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlProtocol {
    #[default]
    Http,
    Https,
}

impl UrlProtocol {
    pub fn scheme(self) -> &'static str {
        match self {
            UrlProtocol::Http => "http",
            UrlProtocol::Https => "https",
        }
    }
}

/// A time-bounded GET link for one object.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub url: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

/// S3-style operations the file services depend on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> StoreResult<Vec<String>>;

    /// Returns `BucketAlreadyExists` when the bucket is already there.
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: PutOptions,
        progress: &dyn ProgressSink,
    ) -> StoreResult<()>;

    /// Returns `ObjectNotFound` when nothing is stored under `key`.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject>;

    /// Same lookup as [`get_object`](Self::get_object) without opening the
    /// payload.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead>;

    /// Keys under `prefix`, in lexicographic order.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Status the store answered with; `204 No Content` is the only success.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<StatusCode>;

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        protocol: UrlProtocol,
    ) -> StoreResult<PresignedUrl>;
}

/// Case-insensitive metadata lookup; S3 lower-cases user metadata keys.
pub fn tag<'a>(tags: &'a MetadataTags, name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_floored_and_capped() {
        assert_eq!(percent_of(0, 10), 0);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(2, 3), 66);
        assert_eq!(percent_of(10, 10), 100);
        assert_eq!(percent_of(12, 10), 100);
        assert_eq!(percent_of(0, 0), 100);
    }

    #[test]
    fn tag_lookup_ignores_case() {
        let mut tags = MetadataTags::new();
        tags.insert("file-name".into(), "YS50eHQ=".into());
        assert_eq!(tag(&tags, "File-Name"), Some("YS50eHQ="));
        assert_eq!(tag(&tags, "Owner-Id"), None);
    }
}
