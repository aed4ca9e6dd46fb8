//! File services: key scheme, object access, progress tracking, group
//! uploads, archives and sharing, composed behind [`FileHub`].

pub mod archive;
pub mod keys;
pub mod object_access;
pub mod progress;
pub mod share_service;
pub mod upload_service;

use crate::{
    errors::FileHubResult,
    models::{
        file::FileDetails,
        upload::{UploadTask, UploadedFileGroup},
    },
    store::{ObjectStore, PresignedUrl, StoredObject},
};
use object_access::ObjectAccess;
use progress::ProgressTracker;
use share_service::ShareService;
use std::{sync::Arc, time::Duration};
use upload_service::UploadService;
use uuid::Uuid;

pub const DEFAULT_BUCKET: &str = "common-bucket";
pub const DEFAULT_SHARE_EXPIRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub bucket: String,
    pub share_expiry: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            share_expiry: DEFAULT_SHARE_EXPIRY,
        }
    }
}

/// Everything the HTTP layer needs, keyed by owner/group/file ids.
#[derive(Clone)]
pub struct FileHub {
    access: ObjectAccess,
    tracker: ProgressTracker,
    uploads: UploadService,
    shares: ShareService,
}

impl FileHub {
    /// Build the services and start the progress tracker on the current
    /// runtime.
    pub fn new(store: Arc<dyn ObjectStore>, settings: HubSettings) -> Self {
        let access = ObjectAccess::new(store, settings.bucket);
        let tracker = ProgressTracker::spawn();
        Self {
            uploads: UploadService::new(access.clone(), tracker.clone()),
            shares: ShareService::new(access.clone(), settings.share_expiry),
            access,
            tracker,
        }
    }

    pub fn access(&self) -> &ObjectAccess {
        &self.access
    }

    pub async fn upload_group(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        tasks: Vec<UploadTask>,
    ) -> FileHubResult<UploadedFileGroup> {
        self.uploads.upload_group(owner_id, group_id, tasks).await
    }

    pub async fn file_progress(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        file_id: Uuid,
    ) -> FileHubResult<u8> {
        self.tracker
            .file_progress(&keys::group_prefix(owner_id, group_id), file_id)
            .await
    }

    pub async fn group_progress(&self, owner_id: Uuid, group_id: Uuid) -> FileHubResult<u8> {
        self.tracker
            .group_progress(&keys::group_prefix(owner_id, group_id))
            .await
    }

    pub async fn get_file(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        file_id: Uuid,
    ) -> FileHubResult<StoredObject> {
        self.access
            .get(&keys::object_key(owner_id, group_id, file_id))
            .await
    }

    pub async fn file_details(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        file_id: Uuid,
    ) -> FileHubResult<FileDetails> {
        let head = self
            .access
            .head(&keys::object_key(owner_id, group_id, file_id))
            .await?;
        FileDetails::from_head(&head)
    }

    /// Every object of the group, in fetch-completion order.
    pub async fn get_group(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
    ) -> FileHubResult<Vec<StoredObject>> {
        self.access
            .list_and_fetch(&keys::group_prefix(owner_id, group_id))
            .await
    }

    pub async fn group_details(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
    ) -> FileHubResult<Vec<FileDetails>> {
        self.access
            .list_and_head(&keys::group_prefix(owner_id, group_id))
            .await?
            .iter()
            .map(FileDetails::from_head)
            .collect()
    }

    /// Details of every file the owner has stored; none at all is an empty list.
    pub async fn list_owner_files(&self, owner_id: Uuid) -> FileHubResult<Vec<FileDetails>> {
        let mut files = self
            .access
            .head_prefix(&owner_id.to_string())
            .await?
            .iter()
            .map(FileDetails::from_head)
            .collect::<FileHubResult<Vec<_>>>()?;
        files.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(files)
    }

    pub async fn delete_file(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        file_id: Uuid,
    ) -> FileHubResult<()> {
        self.access
            .delete(&keys::object_key(owner_id, group_id, file_id), file_id)
            .await
    }

    pub async fn share_file(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        file_id: Uuid,
    ) -> FileHubResult<PresignedUrl> {
        self.shares.share_file(owner_id, group_id, file_id).await
    }

    pub async fn share_group(&self, owner_id: Uuid, group_id: Uuid) -> FileHubResult<PresignedUrl> {
        self.shares.share_group(owner_id, group_id).await
    }

    pub fn tracker_running(&self) -> bool {
        self.tracker.is_running()
    }
}
