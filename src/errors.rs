use crate::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Outcomes of the file services.
///
/// `FileAlreadyTransferred` and `GroupAlreadyTransferred` are advisory: they
/// answer a progress query for a transfer that is not (or no longer) running.
#[derive(Debug, Error)]
pub enum FileHubError {
    #[error("file `{key}` not found")]
    FileNotFound { key: String },
    #[error("group `{prefix}` not found")]
    GroupNotFound { prefix: String },
    #[error("failed to upload file {file_name}")]
    FailedToUpload {
        file_name: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to delete file with id {file_id}")]
    FailedToDelete { file_id: String },
    #[error("file already transferred")]
    FileAlreadyTransferred,
    #[error("group already transferred")]
    GroupAlreadyTransferred,
    #[error("group `{0}` is already being uploaded")]
    GroupUploadInProgress(String),
    #[error("an upload group needs at least one file")]
    EmptyGroup,
    #[error("object `{key}` carries invalid metadata: {reason}")]
    InvalidMetadata { key: String, reason: String },
    #[error("progress tracker is not running")]
    TrackerUnavailable,
    #[error("background task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Archive(#[from] async_zip::error::ZipError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FileHubError {
    /// Short machine-readable name used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            FileHubError::FileNotFound { .. } => "FileNotFoundError",
            FileHubError::GroupNotFound { .. } => "GroupNotFoundError",
            FileHubError::FailedToUpload { .. } => "FailedToUploadError",
            FileHubError::FailedToDelete { .. } => "FailedToDeleteError",
            FileHubError::FileAlreadyTransferred => "FileAlreadyTransferredError",
            FileHubError::GroupAlreadyTransferred => "GroupAlreadyTransferredError",
            FileHubError::GroupUploadInProgress(_) => "GroupUploadInProgressError",
            FileHubError::EmptyGroup => "EmptyGroupError",
            FileHubError::InvalidMetadata { .. } => "InvalidMetadataError",
            FileHubError::TrackerUnavailable => "TrackerUnavailableError",
            FileHubError::Task(_) => "TaskError",
            FileHubError::Archive(_) => "ArchiveError",
            FileHubError::Store(_) => "StoreError",
            FileHubError::Io(_) => "IoError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            FileHubError::FileNotFound { .. } | FileHubError::GroupNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            FileHubError::FileAlreadyTransferred
            | FileHubError::GroupAlreadyTransferred
            | FileHubError::GroupUploadInProgress(_) => StatusCode::CONFLICT,
            FileHubError::EmptyGroup => StatusCode::BAD_REQUEST,
            FileHubError::FailedToUpload { .. } | FileHubError::FailedToDelete { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type FileHubResult<T> = Result<T, FileHubError>;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            code: "Error",
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.code,
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<FileHubError> for AppError {
    fn from(err: FileHubError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ObjectNotFound { .. } | StoreError::BucketNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            StoreError::InvalidObjectKey | StoreError::InvalidBucketName { .. } => {
                AppError::bad_request(err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
