//! Test helpers shared by the integration suites.
//!
//! [`FaultyStore`] wraps the in-memory store and lets a test delay or fail
//! individual objects, matched by the trailing file id of their key.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use file_hub::{
    models::upload::UploadTask,
    store::{
        ByteStream, ObjectHead, ObjectStore, PresignedUrl, ProgressSink, PutOptions, StoreError, StoreResult,
        StoredObject, UrlProtocol, memory::MemoryStore,
    },
};
use futures::{StreamExt, stream};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Put fails right away.
    FailPut,
    /// Put waits this long before going through.
    DelayPut(Duration),
    /// Get fails with a backend error.
    FailGet,
    /// Get waits this long before going through.
    DelayGet(Duration),
}

#[derive(Clone, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Mutex<HashMap<Uuid, Fault>>>,
    puts_started: Arc<Mutex<Vec<String>>>,
    gets: Arc<AtomicUsize>,
    put_chunks: Arc<AtomicUsize>,
    buckets_down: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn inject(&self, file_id: Uuid, fault: Fault) {
        self.faults.lock().unwrap().insert(file_id, fault);
    }

    pub fn puts_started(&self) -> Vec<String> {
        self.puts_started.lock().unwrap().clone()
    }

    /// Body chunks received by every put so far.
    pub fn put_chunks(&self) -> usize {
        self.put_chunks.load(Ordering::SeqCst)
    }

    /// Body downloads served so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Make every bucket listing fail from now on.
    pub fn break_buckets(&self) {
        self.buckets_down.store(true, Ordering::SeqCst);
    }

    fn fault_for(&self, key: &str) -> Option<Fault> {
        let id = key.rsplit('/').next()?.parse::<Uuid>().ok()?;
        self.faults.lock().unwrap().get(&id).copied()
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        if self.buckets_down.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected bucket listing failure".into()));
        }
        self.inner.list_buckets().await
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.inner.create_bucket(bucket).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: PutOptions,
        progress: &dyn ProgressSink,
    ) -> StoreResult<()> {
        self.puts_started.lock().unwrap().push(key.to_string());
        match self.fault_for(key) {
            Some(Fault::FailPut) => return Err(StoreError::Backend("injected put failure".into())),
            Some(Fault::DelayPut(delay)) => {
                progress.report(0);
                tokio::time::sleep(delay).await;
            }
            _ => {}
        }
        let counter = self.put_chunks.clone();
        let body = body
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .boxed();
        self.inner
            .put_object(bucket, key, body, options, progress)
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        match self.fault_for(key) {
            Some(Fault::FailGet) => return Err(StoreError::Backend("injected get failure".into())),
            Some(Fault::DelayGet(delay)) => tokio::time::sleep(delay).await,
            _ => {}
        }
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_object(bucket, key).await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        self.inner.head_object(bucket, key).await
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list_keys(bucket, prefix).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<StatusCode> {
        self.inner.delete_object(bucket, key).await
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        protocol: UrlProtocol,
    ) -> StoreResult<PresignedUrl> {
        self.inner
            .presign_get(bucket, key, expires_in, protocol)
            .await
    }
}

pub fn body(data: &[u8]) -> ByteStream {
    let data = Bytes::copy_from_slice(data);
    stream::once(async move { Ok(data) }).boxed()
}

pub fn task(owner_id: Uuid, group_id: Uuid, name: &str, data: &[u8]) -> UploadTask {
    UploadTask {
        owner_id,
        group_id,
        file_id: Uuid::new_v4(),
        body: body(data),
        content_type: "text/plain".into(),
        file_name: name.into(),
        content_length: Some(data.len() as u64),
    }
}

pub async fn read_all(mut body: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}
