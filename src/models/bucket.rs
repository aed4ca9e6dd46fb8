//! A bucket row in the local object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket known to [`LocalStore`](crate::store::local::LocalStore).
///
/// Buckets act as top-level namespaces for objects. The file services only
/// ever use one well-known bucket, but the store itself does not care.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal identifier used as the foreign key of object rows.
    pub id: Uuid,

    /// Bucket name (S3 naming rules).
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
