//! S3-compatible object store backend (AWS S3, MinIO, ...) over `aws-sdk-s3`.
//!
//! Bodies that fit in a single part go up with one `PutObject`; anything
//! larger is sent as a multi-part upload in [`PART_SIZE`] chunks, with up to
//! [`PARTS_IN_FLIGHT`] parts on the wire at once. Progress is reported as
//! parts complete and the upload is aborted on the first failed part.

use super::{
    ByteStream, ObjectHead, ObjectStore, ProgressSink, PresignedUrl, PutOptions, StoreError, StoreResult,
    StoredObject, UrlProtocol, percent_of,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client,
    config::{Credentials, Region, http::HttpResponse},
    error::{DisplayErrorContext, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream as AwsByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{error::Error as StdError, future::Future, time::Duration};
use tokio::task::JoinSet;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use url::Url;

/// Multi-part chunk size. S3 requires at least 5 MiB for every part but the last.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Parts uploaded concurrently for one object.
pub const PARTS_IN_FLIGHT: usize = 4;

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Custom endpoint (e.g. `http://localhost:9000` for MinIO).
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Path-style addressing, required by most self-hosted stores.
    pub force_path_style: bool,
}

/// S3 object store backend.
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "file-hub",
            ));
        }
        let sdk_config = loader.load().await;

        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        debug!(
            endpoint = ?settings.endpoint,
            region = %settings.region,
            "created S3 object store client"
        );

        Self {
            client: S3Client::from_conf(config),
        }
    }

    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Bytes,
        body: ByteStream,
        carry: BytesMut,
        total: Option<u64>,
        progress: &dyn ProgressSink,
    ) -> StoreResult<Vec<CompletedPart>> {
        let client = self.client.clone();
        let (bucket, key, upload_id) = (bucket.to_string(), key.to_string(), upload_id.to_string());

        send_parts(first, body, carry, total, progress, move |number, part| {
            let request = client
                .upload_part()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .part_number(number)
                .body(AwsByteStream::from(part));
            async move {
                let output = request
                    .send()
                    .await
                    .map_err(|err| StoreError::backend(DisplayErrorContext(&err)))?;
                Ok(CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(number)
                    .build())
            }
        })
        .await
    }
}

/// Cut the body into parts and hand each to `send`, keeping at most
/// [`PARTS_IN_FLIGHT`] running. Returns the completed parts ordered by part
/// number. Any failure drops the parts still running.
async fn send_parts<F, Fut>(
    first: Bytes,
    mut body: ByteStream,
    mut carry: BytesMut,
    total: Option<u64>,
    progress: &dyn ProgressSink,
    mut send: F,
) -> StoreResult<Vec<CompletedPart>>
where
    F: FnMut(i32, Bytes) -> Fut,
    Fut: Future<Output = StoreResult<CompletedPart>> + Send + 'static,
{
    let mut in_flight: JoinSet<StoreResult<(u64, CompletedPart)>> = JoinSet::new();
    let mut parts = Vec::new();
    let mut pending = Some(first);
    let mut eof = false;
    let mut number: i32 = 1;
    let mut sent: u64 = 0;

    loop {
        while in_flight.len() < PARTS_IN_FLIGHT {
            let part = match pending.take() {
                Some(part) => part,
                None if eof => break,
                None => {
                    let (part, end) = next_part(&mut body, &mut carry).await?;
                    eof = end;
                    part
                }
            };
            if part.is_empty() {
                continue;
            }
            let len = part.len() as u64;
            let upload = send(number, part);
            in_flight.spawn(async move { upload.await.map(|done| (len, done)) });
            number += 1;
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        let (len, part) = joined.map_err(StoreError::backend)??;
        sent += len;
        if let Some(total) = total {
            progress.report(percent_of(sent, total).min(99));
        }
        parts.push(part);
    }

    parts.sort_by_key(|part| part.part_number());
    Ok(parts)
}

/// Fill `carry` up to one part. Returns the part and whether the body ended.
async fn next_part(body: &mut ByteStream, carry: &mut BytesMut) -> StoreResult<(Bytes, bool)> {
    while carry.len() < PART_SIZE {
        match body.next().await {
            Some(chunk) => carry.extend_from_slice(&chunk?),
            None => return Ok((carry.split().freeze(), true)),
        }
    }
    Ok((carry.split_to(PART_SIZE).freeze(), false))
}

/// Map an SDK failure to `ObjectNotFound` when the store answered 404.
fn classify<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StoreError
where
    E: StdError + 'static,
{
    if err.raw_response().map(|r| r.status().as_u16()) == Some(404) {
        StoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        StoreError::backend(DisplayErrorContext(&err))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| StoreError::backend(DisplayErrorContext(&err)))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                debug!(bucket, "created bucket");
                Ok(())
            }
            Err(err) => {
                let exists = err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists())
                    .unwrap_or(false);
                if exists {
                    Err(StoreError::BucketAlreadyExists(bucket.to_string()))
                } else {
                    Err(StoreError::backend(DisplayErrorContext(&err)))
                }
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteStream,
        options: PutOptions,
        progress: &dyn ProgressSink,
    ) -> StoreResult<()> {
        progress.report(0);
        let mut carry = BytesMut::with_capacity(PART_SIZE);
        let (first, eof) = next_part(&mut body, &mut carry).await?;

        if eof {
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type(&options.content_type)
                .set_metadata(Some(options.metadata))
                .body(AwsByteStream::from(first))
                .send()
                .await
                .map_err(|err| StoreError::backend(DisplayErrorContext(&err)))?;
            progress.report(100);
            return Ok(());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(&options.content_type)
            .set_metadata(Some(options.metadata))
            .send()
            .await
            .map_err(|err| StoreError::backend(DisplayErrorContext(&err)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Backend("multipart upload without an upload id".into()))?
            .to_string();
        debug!(bucket, key, upload_id = %upload_id, "started multipart upload");

        let parts = match self
            .upload_parts(
                bucket,
                key,
                &upload_id,
                first,
                body,
                carry,
                options.content_length,
                progress,
            )
            .await
        {
            Ok(parts) => parts,
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key,
                        error = %DisplayErrorContext(&abort_err),
                        "failed to abort multipart upload"
                    );
                }
                return Err(err);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| StoreError::backend(DisplayErrorContext(&err)))?;

        progress.report(100);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, bucket, key))?;

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let content_length = output.content_length().unwrap_or(0).max(0) as u64;
        let last_modified = output
            .last_modified()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
            .unwrap_or_else(Utc::now);
        let metadata = output.metadata().cloned().unwrap_or_default();

        Ok(StoredObject {
            key: key.to_string(),
            content_type,
            content_length,
            last_modified,
            metadata,
            body: ReaderStream::new(output.body.into_async_read()).boxed(),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<ObjectHead> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, bucket, key))?;

        Ok(ObjectHead {
            key: key.to_string(),
            content_type: output
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            content_length: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: output
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_else(Utc::now),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|err| StoreError::backend(DisplayErrorContext(&err)))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match (output.is_truncated(), output.next_continuation_token()) {
                (Some(true), Some(next)) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<StatusCode> {
        match self.client.delete_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(StatusCode::NO_CONTENT),
            Err(err) => match err.raw_response().map(|r| r.status().as_u16()) {
                Some(status) => {
                    Ok(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY))
                }
                None => Err(StoreError::backend(DisplayErrorContext(&err))),
            },
        }
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        protocol: UrlProtocol,
    ) -> StoreResult<PresignedUrl> {
        let presign_err = |reason: String| StoreError::Presign {
            key: key.to_string(),
            reason,
        };

        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| presign_err(err.to_string()))?;
        let issued_at = Utc::now();
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| presign_err(DisplayErrorContext(&err).to_string()))?;

        // The scheme is not part of the SigV4 canonical request.
        let mut url = Url::parse(presigned.uri()).map_err(|err| presign_err(err.to_string()))?;
        url.set_scheme(protocol.scheme())
            .map_err(|_| presign_err(format!("cannot use scheme {}", protocol.scheme())))?;

        let expires_at = issued_at
            + chrono::Duration::from_std(expires_in).map_err(|err| presign_err(err.to_string()))?;

        Ok(PresignedUrl {
            url: url.to_string(),
            key: key.to_string(),
            expires_at,
        })
    }
}
