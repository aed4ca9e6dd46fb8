use crate::{
    errors::FileHubResult,
    models::file::FileMetadata,
    services::{archive, keys, object_access::ObjectAccess},
    store::{NoProgress, PresignedUrl, PutOptions},
};
use bytes::Bytes;
use chrono::Local;
use futures::{StreamExt, stream};
use std::{io, time::Duration};
use tracing::info;
use uuid::Uuid;

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// `files{HHMMSS-ddmmyy}.zip`, stamped with the local time.
pub fn archive_file_name() -> String {
    format!("files{}.zip", Local::now().format("%H%M%S-%d%m%y"))
}

/// Issues time-bounded download links for files and whole groups.
#[derive(Clone)]
pub struct ShareService {
    access: ObjectAccess,
    expires_in: Duration,
}

impl ShareService {
    pub fn new(access: ObjectAccess, expires_in: Duration) -> Self {
        Self { access, expires_in }
    }

    /// Link to one stored file. Fails with `FileNotFound` if it is not there.
    pub async fn share_file(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        file_id: Uuid,
    ) -> FileHubResult<PresignedUrl> {
        let key = keys::object_key(owner_id, group_id, file_id);
        self.access.get(&key).await?;
        self.access.presign(&key, self.expires_in).await
    }

    /// Zip the group, store the archive as a new single-file group and link
    /// to it.
    pub async fn share_group(&self, owner_id: Uuid, group_id: Uuid) -> FileHubResult<PresignedUrl> {
        let prefix = keys::group_prefix(owner_id, group_id);
        let objects = self.access.list_and_fetch(&prefix).await?;
        let files = objects.len();

        let mut buf: Vec<u8> = Vec::new();
        archive::build_zip(&mut buf, objects, true).await?;

        let meta = FileMetadata {
            owner_id,
            group_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            file_name: archive_file_name(),
            content_type: ZIP_CONTENT_TYPE.to_string(),
        };
        let key = keys::object_key(meta.owner_id, meta.group_id, meta.file_id);
        let options = PutOptions {
            content_type: meta.content_type.clone(),
            metadata: meta.to_tags(),
            content_length: Some(buf.len() as u64),
        };
        let body = stream::once(async move { Ok::<_, io::Error>(Bytes::from(buf)) }).boxed();

        self.access
            .put(&key, &meta.file_name, body, options, &NoProgress)
            .await?;
        info!(%owner_id, %group_id, archive = %key, files, "group archived for sharing");

        self.share_file(meta.owner_id, meta.group_id, meta.file_id)
            .await
    }
}
