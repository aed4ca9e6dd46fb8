//! Serves pre-signed links issued by the local object store.

use crate::{
    errors::AppError,
    handlers::file_handlers::object_response,
    models::file::FileMetadata,
    state::AppState,
    store::ObjectStore,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// `GET /objects/{bucket}/{*key}?expires=&signature=`
pub async fn download_signed(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let Some(store) = state.local.as_ref() else {
        return Err(AppError::not_found("signed links are not served by this backend"));
    };

    let now = Utc::now().timestamp();
    if !store
        .signer()
        .verify(&bucket, &key, query.expires, &query.signature, now)
    {
        debug!(bucket, key, "rejected signed link");
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "signature invalid or expired",
        ));
    }

    let object = store.get_object(&bucket, &key).await?;
    let file_name = FileMetadata::from_tags(&object.key, &object.metadata)
        .map(|meta| meta.file_name)
        .unwrap_or_else(|_| key.rsplit('/').next().unwrap_or(&key).to_string());
    Ok(object_response(object, &file_name))
}
