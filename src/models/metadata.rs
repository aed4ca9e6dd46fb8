//! Metadata tags persisted next to local objects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single `name = value` tag attached to an object.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct MetadataTag {
    pub name: String,
    pub value: String,
}
