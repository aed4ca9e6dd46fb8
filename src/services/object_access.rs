//! Single-object access and prefix fan-out over the configured bucket.
//!
//! Every operation first makes sure the bucket exists. Store errors other
//! than "not found" are passed through untouched; upload and delete failures
//! are reported as `FailedToUpload` / `FailedToDelete`.

use crate::{
    errors::{FileHubError, FileHubResult},
    models::{file::FileMetadata, upload::UploadTask},
    services::keys,
    store::{
        ByteStream, ObjectHead, ObjectStore, PresignedUrl, ProgressSink, PutOptions, StoreError,
        StoredObject, UrlProtocol,
    },
};
use axum::http::StatusCode;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ObjectAccess {
    store: Arc<dyn ObjectStore>,
    bucket: Arc<str>,
}

impl ObjectAccess {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Create the bucket unless the store already lists it.
    ///
    /// Not synchronized: two cold callers may both try to create it, so an
    /// "already exists" answer counts as success.
    pub async fn ensure_bucket(&self) -> FileHubResult<()> {
        let buckets = self.store.list_buckets().await?;
        if buckets.iter().any(|b| *b == *self.bucket) {
            return Ok(());
        }

        match self.store.create_bucket(&self.bucket).await {
            Ok(()) => {
                info!(bucket = %self.bucket, "created bucket");
                Ok(())
            }
            Err(StoreError::BucketAlreadyExists(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Cheap reachability check for readiness probes.
    pub async fn probe(&self) -> FileHubResult<()> {
        self.store.list_buckets().await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> FileHubResult<StoredObject> {
        self.ensure_bucket().await?;
        self.fetch(key).await
    }

    async fn fetch(&self, key: &str) -> FileHubResult<StoredObject> {
        self.store
            .get_object(&self.bucket, key)
            .await
            .map_err(|err| not_found_as_file(err, key))
    }

    /// Metadata of one object without downloading it.
    pub async fn head(&self, key: &str) -> FileHubResult<ObjectHead> {
        self.ensure_bucket().await?;
        self.head_of(key).await
    }

    async fn head_of(&self, key: &str) -> FileHubResult<ObjectHead> {
        self.store
            .head_object(&self.bucket, key)
            .await
            .map_err(|err| not_found_as_file(err, key))
    }

    /// Upload one object. Any store failure becomes `FailedToUpload(file_name)`.
    pub async fn put(
        &self,
        key: &str,
        file_name: &str,
        body: ByteStream,
        options: PutOptions,
        progress: &dyn ProgressSink,
    ) -> FileHubResult<()> {
        let stored = match self.ensure_bucket().await {
            Ok(()) => {
                self.store
                    .put_object(&self.bucket, key, body, options, progress)
                    .await
            }
            Err(FileHubError::Store(source)) => Err(source),
            Err(other) => return Err(other),
        };
        stored.map_err(|source| {
            warn!(key, file_name, error = %source, "upload failed");
            FileHubError::FailedToUpload {
                file_name: file_name.to_string(),
                source,
            }
        })
    }

    /// Upload one file of a group, tagged with its metadata.
    pub async fn put_file(
        &self,
        task: UploadTask,
        progress: &dyn ProgressSink,
    ) -> FileHubResult<Uuid> {
        let key = keys::object_key(task.owner_id, task.group_id, task.file_id);
        let metadata = FileMetadata {
            owner_id: task.owner_id,
            group_id: task.group_id,
            file_id: task.file_id,
            file_name: task.file_name,
            content_type: task.content_type,
        };
        let options = PutOptions {
            content_type: metadata.content_type.clone(),
            metadata: metadata.to_tags(),
            content_length: task.content_length,
        };

        self.put(&key, &metadata.file_name, task.body, options, progress)
            .await?;
        debug!(key = %key, "file uploaded");
        Ok(task.file_id)
    }

    /// Succeeds only when the store confirms with `204 No Content`.
    pub async fn delete(&self, key: &str, file_id: Uuid) -> FileHubResult<()> {
        self.ensure_bucket().await?;
        let status = self.store.delete_object(&self.bucket, key).await?;
        if status == StatusCode::NO_CONTENT {
            debug!(key, "deleted object");
            Ok(())
        } else {
            warn!(key, status = status.as_u16(), "delete not confirmed");
            Err(FileHubError::FailedToDelete {
                file_id: file_id.to_string(),
            })
        }
    }

    /// List every key under `prefix` and fetch the objects concurrently.
    ///
    /// An empty listing is `GroupNotFound`. The first failed fetch wins and
    /// the fetches still running are aborted.
    pub async fn list_and_fetch(&self, prefix: &str) -> FileHubResult<Vec<StoredObject>> {
        let objects = self
            .fan_out(prefix, |access, key| async move { access.fetch(&key).await })
            .await?;
        non_empty(prefix, objects)
    }

    /// Like [`list_and_fetch`](Self::list_and_fetch) with metadata only.
    pub async fn list_and_head(&self, prefix: &str) -> FileHubResult<Vec<ObjectHead>> {
        let heads = self.head_prefix(prefix).await?;
        non_empty(prefix, heads)
    }

    /// Metadata of every object under `prefix`; none at all is an empty list.
    pub async fn head_prefix(&self, prefix: &str) -> FileHubResult<Vec<ObjectHead>> {
        self.fan_out(prefix, |access, key| async move { access.head_of(&key).await })
            .await
    }

    /// Run `op` for every key under `prefix` concurrently, collecting the
    /// results in completion order.
    async fn fan_out<T, F, Fut>(&self, prefix: &str, op: F) -> FileHubResult<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(ObjectAccess, String) -> Fut,
        Fut: Future<Output = FileHubResult<T>> + Send + 'static,
    {
        self.ensure_bucket().await?;
        let keys = self
            .store
            .list_keys(&self.bucket, &keys::listing_prefix(prefix))
            .await?;
        debug!(prefix, count = keys.len(), "listed prefix");

        let mut pending = JoinSet::new();
        for key in keys {
            pending.spawn(op(self.clone(), key));
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(joined) = pending.join_next().await {
            let outcome = joined
                .map_err(|err| FileHubError::Task(err.to_string()))
                .and_then(|result| result);
            match outcome {
                Ok(item) => results.push(item),
                Err(err) => {
                    warn!(prefix, error = %err, "fan-out fetch failed");
                    pending.abort_all();
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    pub async fn presign(&self, key: &str, expires_in: Duration) -> FileHubResult<PresignedUrl> {
        Ok(self
            .store
            .presign_get(&self.bucket, key, expires_in, UrlProtocol::Http)
            .await?)
    }
}

fn not_found_as_file(err: StoreError, key: &str) -> FileHubError {
    if err.is_not_found() {
        FileHubError::FileNotFound {
            key: key.to_string(),
        }
    } else {
        err.into()
    }
}

fn non_empty<T>(prefix: &str, items: Vec<T>) -> FileHubResult<Vec<T>> {
    if items.is_empty() {
        return Err(FileHubError::GroupNotFound {
            prefix: prefix.to_string(),
        });
    }
    Ok(items)
}
