//! An object row in the local object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Bookkeeping for a single stored object.
///
/// The payload itself lives on disk; this row only records where it belongs
/// and what it looks like.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectRecord {
    pub id: Uuid,

    /// Parent bucket.
    pub bucket_id: Uuid,

    /// Object key (`{owner}/{group}/{file}` for file-hub objects).
    pub key: String,

    /// MIME type supplied on upload.
    pub content_type: String,

    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: String,

    pub last_modified: DateTime<Utc>,
}
