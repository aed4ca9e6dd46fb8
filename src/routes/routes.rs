//! Defines the HTTP routes of the file hub.
//!
//! ## Structure
//! - **Files** (owner from `X-Owner-Id`)
//!   - `POST   /api/files/upload`: multipart upload of a group, ids optionally
//!     chosen through `X-Group-Id` / `X-File-Ids`
//!   - `GET    /api/files`: every file of the owner
//!
//! - **Groups**
//!   - `GET    /api/groups/{group_id}`: details of each file
//!   - `GET    /api/groups/{group_id}/stream`: zip of the group
//!   - `GET    /api/groups/{group_id}/progress`: aggregate upload progress
//!   - `POST   /api/groups/{group_id}/share`: pre-signed link to a zip
//!
//! - **Single files**
//!   - `GET    /api/groups/{group_id}/files/{file_id}`: details
//!   - `DELETE /api/groups/{group_id}/files/{file_id}`
//!   - `GET    /api/groups/{group_id}/files/{file_id}/stream`
//!   - `GET    /api/groups/{group_id}/files/{file_id}/progress`
//!   - `POST   /api/groups/{group_id}/files/{file_id}/share`
//!
//! - **Signed downloads**: `GET /objects/{bucket}/{*key}?expires=&signature=`

use crate::{
    handlers::{
        file_handlers::{
            delete_file, file_progress, get_file, get_group, group_progress, list_files,
            share_file, share_group, stream_file, stream_group, upload_files,
        },
        health_handlers::{healthz, readyz},
        object_handlers::download_signed,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. `upload_limit` caps the multipart upload body in bytes.
pub fn routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/files/upload",
            post(upload_files).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/files", get(list_files))
        .route("/api/groups/{group_id}", get(get_group))
        .route("/api/groups/{group_id}/stream", get(stream_group))
        .route("/api/groups/{group_id}/progress", get(group_progress))
        .route("/api/groups/{group_id}/share", post(share_group))
        .route(
            "/api/groups/{group_id}/files/{file_id}",
            get(get_file).delete(delete_file),
        )
        .route(
            "/api/groups/{group_id}/files/{file_id}/stream",
            get(stream_file),
        )
        .route(
            "/api/groups/{group_id}/files/{file_id}/progress",
            get(file_progress),
        )
        .route(
            "/api/groups/{group_id}/files/{file_id}/share",
            post(share_file),
        )
        .route("/objects/{bucket}/{*key}", get(download_signed))
}
