use crate::{
    errors::{FileHubError, FileHubResult},
    models::upload::{UploadTask, UploadedFileGroup},
    services::{keys, object_access::ObjectAccess, progress::ProgressTracker},
};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Uploads every file of a group concurrently and reports the group result.
#[derive(Clone)]
pub struct UploadService {
    access: ObjectAccess,
    tracker: ProgressTracker,
}

impl UploadService {
    pub fn new(access: ObjectAccess, tracker: ProgressTracker) -> Self {
        Self { access, tracker }
    }

    /// Upload `tasks` as group `group_id` of `owner_id`.
    ///
    /// Results are consumed in completion order, which is also the order of
    /// the returned file ids. The first failure is returned as-is; uploads
    /// still running are aborted and the group stops being tracked.
    pub async fn upload_group(
        &self,
        owner_id: Uuid,
        group_id: Uuid,
        tasks: Vec<UploadTask>,
    ) -> FileHubResult<UploadedFileGroup> {
        if tasks.is_empty() {
            return Err(FileHubError::EmptyGroup);
        }

        let prefix = keys::group_prefix(owner_id, group_id);
        let file_ids: Vec<Uuid> = tasks.iter().map(|t| t.file_id).collect();
        self.tracker.begin(&prefix, file_ids).await?;

        info!(%owner_id, %group_id, files = tasks.len(), "group upload started");

        let mut uploads = JoinSet::new();
        for task in tasks {
            let access = self.access.clone();
            let reporter = self.tracker.reporter(&prefix, task.file_id);
            uploads.spawn(async move { access.put_file(task, &reporter).await });
        }

        let mut completed = Vec::with_capacity(uploads.len());
        while let Some(joined) = uploads.join_next().await {
            let outcome = joined
                .map_err(|err| FileHubError::Task(err.to_string()))
                .and_then(|result| result);
            match outcome {
                Ok(file_id) => completed.push(file_id),
                Err(err) => {
                    uploads.abort_all();
                    self.tracker.release(&prefix);
                    warn!(%owner_id, %group_id, error = %err, "group upload failed");
                    return Err(err);
                }
            }
        }

        // Normally already gone once every file reported 100.
        self.tracker.release(&prefix);
        info!(%owner_id, %group_id, "group upload finished");

        Ok(UploadedFileGroup {
            group_id,
            file_ids: completed,
        })
    }
}
