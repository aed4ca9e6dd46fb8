//! HTTP handlers for file groups: upload, details, streaming, progress,
//! sharing and delete. The owner comes from the `X-Owner-Id` header.

use crate::{
    errors::{AppError, FileHubError},
    models::{
        file::{FileDetails, FileMetadata},
        upload::{UploadTask, UploadedFileGroup},
    },
    services::{archive, share_service},
    state::AppState,
    store::{ByteStream, PresignedUrl, StoredObject},
};
use axum::{
    Json,
    body::Body,
    extract::{
        FromRequestParts, Multipart, Path, State,
        multipart::{Field, MultipartError},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt},
    task,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

pub const OWNER_HEADER: &str = "x-owner-id";
/// Optional group id chosen by the uploader.
pub const GROUP_ID_HEADER: &str = "x-group-id";
/// Optional comma-separated file ids, one per uploaded file in field order.
pub const FILE_IDS_HEADER: &str = "x-file-ids";
const UPLOAD_FIELD: &str = "files";
const ZIP_PIPE_CAPACITY: usize = 64 * 1024;
const SPOOL_CHUNK: usize = 64 * 1024;

/// Caller identity as supplied by the fronting auth layer.
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "missing X-Owner-Id header"))?;
        value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(OwnerId)
            .ok_or_else(|| AppError::bad_request("X-Owner-Id must be a UUID"))
    }
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub progress: u8,
}

/// `POST /api/files/upload`: every `files` field becomes one file of a group.
///
/// Ids sent in `X-Group-Id` / `X-File-Ids` are used as-is so the uploader
/// can poll the progress routes while the request is running; otherwise
/// they are generated. Each field is spooled to a temporary file and
/// streamed to the store from there.
pub async fn upload_files(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadedFileGroup>, AppError> {
    let group_id = header_uuid(&headers, GROUP_ID_HEADER)?.unwrap_or_else(Uuid::new_v4);
    let requested = header_uuids(&headers, FILE_IDS_HEADER)?;
    let mut requested_ids = requested.iter().copied();
    let mut tasks = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_id = if requested.is_empty() {
            Uuid::new_v4()
        } else {
            requested_ids.next().ok_or_else(|| {
                AppError::bad_request("X-File-Ids lists fewer ids than uploaded files")
            })?
        };
        let file_name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let (body, size) = spool_field(field).await?;
        debug!(%group_id, %file_id, size, "spooled upload field");

        tasks.push(UploadTask {
            owner_id,
            group_id,
            file_id,
            body,
            content_type,
            file_name,
            content_length: Some(size),
        });
    }

    if !requested.is_empty() && requested.len() != tasks.len() {
        return Err(AppError::bad_request(
            "X-File-Ids lists more ids than uploaded files",
        ));
    }

    let group = state.hub.upload_group(owner_id, group_id, tasks).await?;
    Ok(Json(group))
}

/// `GET /api/files`
pub async fn list_files(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<Vec<FileDetails>>, AppError> {
    Ok(Json(state.hub.list_owner_files(owner_id).await?))
}

/// `GET /api/groups/{group_id}`
pub async fn get_group(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<FileDetails>>, AppError> {
    Ok(Json(state.hub.group_details(owner_id, group_id).await?))
}

/// `GET /api/groups/{group_id}/stream`: the whole group as a zip, written
/// while it is being sent.
pub async fn stream_group(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(group_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let objects = state.hub.get_group(owner_id, group_id).await?;

    let (mut writer, reader) = tokio::io::duplex(ZIP_PIPE_CAPACITY);
    tokio::spawn(async move {
        if let Err(err) = archive::build_zip(&mut writer, objects, false).await {
            warn!(%group_id, error = %err, "zip stream aborted");
        }
    });

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(share_service::ZIP_CONTENT_TYPE),
    );
    set_attachment(headers, &share_service::archive_file_name());
    Ok(response)
}

/// `GET /api/groups/{group_id}/progress`
pub async fn group_progress(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(group_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = state.hub.group_progress(owner_id, group_id).await?;
    Ok(Json(ProgressResponse { progress }))
}

/// `POST /api/groups/{group_id}/share`
pub async fn share_group(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(group_id): Path<Uuid>,
) -> Result<Json<PresignedUrl>, AppError> {
    Ok(Json(state.hub.share_group(owner_id, group_id).await?))
}

/// `GET /api/groups/{group_id}/files/{file_id}`
pub async fn get_file(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path((group_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<FileDetails>, AppError> {
    Ok(Json(
        state.hub.file_details(owner_id, group_id, file_id).await?,
    ))
}

/// `GET /api/groups/{group_id}/files/{file_id}/stream`
pub async fn stream_file(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path((group_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let object = state.hub.get_file(owner_id, group_id, file_id).await?;
    let file_name = FileMetadata::from_tags(&object.key, &object.metadata)?.file_name;
    Ok(object_response(object, &file_name))
}

/// `GET /api/groups/{group_id}/files/{file_id}/progress`
pub async fn file_progress(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path((group_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = state.hub.file_progress(owner_id, group_id, file_id).await?;
    Ok(Json(ProgressResponse { progress }))
}

/// `POST /api/groups/{group_id}/files/{file_id}/share`
pub async fn share_file(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path((group_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PresignedUrl>, AppError> {
    Ok(Json(
        state.hub.share_file(owner_id, group_id, file_id).await?,
    ))
}

/// `DELETE /api/groups/{group_id}/files/{file_id}`
pub async fn delete_file(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path((group_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state.hub.delete_file(owner_id, group_id, file_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Copy one multipart field into an anonymous temp file. Returns a stream
/// over the copy and its size.
async fn spool_field(mut field: Field<'_>) -> Result<(ByteStream, u64), AppError> {
    let spool = task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .map_err(FileHubError::from)?;
    let mut spool = File::from_std(spool);

    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        spool.write_all(&chunk).await.map_err(FileHubError::from)?;
        size += chunk.len() as u64;
    }
    spool.flush().await.map_err(FileHubError::from)?;
    spool.rewind().await.map_err(FileHubError::from)?;

    Ok((ReaderStream::with_capacity(spool, SPOOL_CHUNK).boxed(), size))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::bad_request(format!("{name} must be a UUID")))
}

fn header_uuids(headers: &HeaderMap, name: &str) -> Result<Vec<Uuid>, AppError> {
    let Some(value) = headers.get(name) else {
        return Ok(Vec::new());
    };
    let invalid = || AppError::bad_request(format!("{name} must be comma-separated UUIDs"));
    let ids = value
        .to_str()
        .map_err(|_| invalid())?
        .split(',')
        .map(|id| Uuid::parse_str(id.trim()).map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    if !ids.iter().all(|id| seen.insert(*id)) {
        return Err(AppError::bad_request(format!("{name} repeats an id")));
    }
    Ok(ids)
}

/// Stream an object back with its content headers.
pub(crate) fn object_response(object: StoredObject, file_name: &str) -> Response {
    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.content_length));
    if let Ok(value) = HeaderValue::from_str(&object.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    set_attachment(headers, file_name);

    *response.body_mut() = Body::from_stream(object.body);
    response
}

fn set_attachment(headers: &mut HeaderMap, file_name: &str) {
    // Non-ASCII names fall back to the RFC 5987 form.
    let value = if file_name.is_ascii() && !file_name.contains('"') {
        format!("attachment; filename=\"{file_name}\"")
    } else {
        let encoded: String = url::form_urlencoded::byte_serialize(file_name.as_bytes()).collect();
        format!("attachment; filename*=UTF-8''{}", encoded.replace('+', "%20"))
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}
