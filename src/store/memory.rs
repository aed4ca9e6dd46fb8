//! In-process object store.
//!
//! Keeps every bucket as an ordered map of key → object bytes. Payloads are
//! fully buffered, so this backend is meant for development and tests.

use super::{
    ByteStream, MetadataTags, ObjectHead, ObjectStore, ProgressSink, PresignedUrl, PutOptions, StoreError,
    StoreResult, StoredObject, UrlProtocol, percent_of,
};
use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    metadata: MetadataTags,
    last_modified: DateTime<Utc>,
}

type Buckets = HashMap<String, BTreeMap<String, MemoryObject>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    buckets: Arc<RwLock<Buckets>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lookup(&self, bucket: &str, key: &str) -> StoreResult<MemoryObject> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(StoreError::BucketAlreadyExists(bucket.to_string()));
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        debug!(bucket, "created in-memory bucket");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteStream,
        options: PutOptions,
        progress: &dyn ProgressSink,
    ) -> StoreResult<()> {
        if !self.buckets.read().await.contains_key(bucket) {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }

        progress.report(0);
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);
            if let Some(total) = options.content_length {
                // 100 is only reported once the object is committed.
                progress.report(percent_of(buf.len() as u64, total).min(99));
            }
        }

        let object = MemoryObject {
            data: buf.freeze(),
            content_type: options.content_type,
            metadata: options.metadata,
            last_modified: Utc::now(),
        };

        self.buckets
            .write()
            .await
            .get_mut(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?
            .insert(key.to_string(), object);

        progress.report(100);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        let object = self.lookup(bucket, key).await?;
        Ok(StoredObject {
            key: key.to_string(),
            content_type: object.content_type,
            content_length: object.data.len() as u64,
            last_modified: object.last_modified,
            metadata: object.metadata,
            body: stream::once(async move { Ok(object.data) }).boxed(),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let object = self.lookup(bucket, key).await?;
        Ok(ObjectHead {
            key: key.to_string(),
            content_type: object.content_type,
            content_length: object.data.len() as u64,
            last_modified: object.last_modified,
            metadata: object.metadata,
        })
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<StatusCode> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        Ok(match objects.remove(key) {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::NOT_FOUND,
        })
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        protocol: UrlProtocol,
    ) -> StoreResult<PresignedUrl> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).map_err(|err| StoreError::Presign {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        Ok(PresignedUrl {
            url: format!(
                "{}://memory.local/{}/{}?expires={}",
                protocol.scheme(),
                bucket,
                key,
                expires_at.timestamp()
            ),
            key: key.to_string(),
            expires_at,
        })
    }
}
