//! Tag scheme carried by every stored file.
//!
//! Object stores only transport header-safe metadata, so the original file
//! name is stored base64-encoded and decoded on every read.

use crate::{
    errors::{FileHubError, FileHubResult},
    store::{MetadataTags, ObjectHead, tag},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const OWNER_ID_TAG: &str = "Owner-Id";
pub const FILE_ID_TAG: &str = "File-Id";
pub const GROUP_ID_TAG: &str = "Group-Id";
pub const FILE_NAME_TAG: &str = "File-Name";
pub const CONTENT_TYPE_TAG: &str = "Content-Type";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn encode_file_name(name: &str) -> String {
    general_purpose::STANDARD.encode(name)
}

pub fn decode_file_name(encoded: &str) -> Result<String, String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| err.to_string())?;
    String::from_utf8(bytes).map_err(|err| err.to_string())
}

/// Decoded metadata of one stored file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    pub owner_id: Uuid,
    pub group_id: Uuid,
    pub file_id: Uuid,
    pub file_name: String,
    pub content_type: String,
}

impl FileMetadata {
    pub fn to_tags(&self) -> MetadataTags {
        MetadataTags::from([
            (OWNER_ID_TAG.to_string(), self.owner_id.to_string()),
            (FILE_ID_TAG.to_string(), self.file_id.to_string()),
            (GROUP_ID_TAG.to_string(), self.group_id.to_string()),
            (FILE_NAME_TAG.to_string(), encode_file_name(&self.file_name)),
            (CONTENT_TYPE_TAG.to_string(), self.content_type.clone()),
        ])
    }

    /// Parse the tags read back for the object stored under `key`.
    pub fn from_tags(key: &str, tags: &MetadataTags) -> FileHubResult<Self> {
        let invalid = |reason: String| FileHubError::InvalidMetadata {
            key: key.to_string(),
            reason,
        };
        let required = |name: &str| tag(tags, name).ok_or_else(|| invalid(format!("missing {name}")));
        let uuid = |name: &str| {
            required(name)?
                .parse::<Uuid>()
                .map_err(|err| invalid(format!("{name}: {err}")))
        };

        let file_name = decode_file_name(required(FILE_NAME_TAG)?)
            .map_err(|err| invalid(format!("{FILE_NAME_TAG}: {err}")))?;

        Ok(Self {
            owner_id: uuid(OWNER_ID_TAG)?,
            group_id: uuid(GROUP_ID_TAG)?,
            file_id: uuid(FILE_ID_TAG)?,
            file_name,
            content_type: tag(tags, CONTENT_TYPE_TAG)
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
        })
    }
}

/// What callers get to see about a stored file.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    pub file_id: Uuid,
    pub group_id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    pub content_length: u64,
}

impl FileDetails {
    pub fn from_head(head: &ObjectHead) -> FileHubResult<Self> {
        let meta = FileMetadata::from_tags(&head.key, &head.metadata)?;
        Ok(Self {
            file_id: meta.file_id,
            group_id: meta.group_id,
            owner_id: meta.owner_id,
            file_name: meta.file_name,
            content_type: head.content_type.clone(),
            last_modified: head.last_modified,
            content_length: head.content_length,
        })
    }
}
