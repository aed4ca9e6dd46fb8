//! Values exchanged with the upload orchestrator.

use crate::store::ByteStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One file of a group upload. Consumed exactly once.
pub struct UploadTask {
    pub owner_id: Uuid,
    pub group_id: Uuid,
    pub file_id: Uuid,
    pub body: ByteStream,
    pub content_type: String,
    pub file_name: String,
    /// Body length when known up front; without it progress jumps 0 → 100.
    pub content_length: Option<u64>,
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("owner_id", &self.owner_id)
            .field("group_id", &self.group_id)
            .field("file_id", &self.file_id)
            .field("content_type", &self.content_type)
            .field("file_name", &self.file_name)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Result of a successful group upload.
///
/// `file_ids` are listed in the order the uploads finished, not the order
/// they were submitted in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileGroup {
    pub group_id: Uuid,
    pub file_ids: Vec<Uuid>,
}
