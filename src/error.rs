//! Error taxonomy.
//!
//! [`PipelineError`] covers the indexing and query pipelines. [`ApiError`] is
//! what the HTTP layer reports: each variant has a fixed status code and a
//! stable machine-readable `code`, rendered as
//!
//! ```json
//! { "error": { "code": "question_too_short", "message": "Question is too short or vague." } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures raised by the indexing pipeline and the query pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid or empty file: {0}")]
    InvalidFile(String),
    #[error("Only PDF files are supported: {0}")]
    UnsupportedFileType(String),
    #[error("Failed to load PDF: {0}")]
    DocumentLoad(String),
    #[error("Failed to create index: {0}")]
    IndexBuild(String),
    #[error("Failed to save index: {0}")]
    IndexPersist(String),
    #[error("Failed to load index: {0}")]
    IndexLoad(String),
    #[error("Query failed: {0}")]
    QueryExecution(String),
}

/// Errors reported synchronously by the upload, ask and status endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Only PDF files are allowed")]
    InvalidFileType,
    #[error("Uploaded file is empty")]
    EmptyUpload,
    #[error("Failed to save file: {0}")]
    StorageWrite(String),
    #[error("Database error: {0}")]
    Metadata(String),
    #[error("Failed to schedule indexing: {0}")]
    IndexScheduling(String),
    #[error("File not found: {0}. Upload the file first.")]
    FileNotFound(String),
    #[error("Question is too short or vague.")]
    QuestionTooShort,
    #[error("Index not found for {filename}{detail}. Please re-upload the file.")]
    IndexNotFound { filename: String, detail: String },
    #[error("Failed to load index: {0}")]
    IndexLoad(String),
    #[error("Query failed: {0}")]
    QueryExecution(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidFileType | ApiError::EmptyUpload | ApiError::QuestionTooShort => {
                StatusCode::BAD_REQUEST
            }
            ApiError::FileNotFound(_) | ApiError::IndexNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::StorageWrite(_)
            | ApiError::Metadata(_)
            | ApiError::IndexScheduling(_)
            | ApiError::IndexLoad(_)
            | ApiError::QueryExecution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidFileType => "invalid_file_type",
            ApiError::EmptyUpload => "empty_upload",
            ApiError::StorageWrite(_) => "storage_write_error",
            ApiError::Metadata(_) => "metadata_error",
            ApiError::IndexScheduling(_) => "index_scheduling_error",
            ApiError::FileNotFound(_) => "file_not_found",
            ApiError::QuestionTooShort => "question_too_short",
            ApiError::IndexNotFound { .. } => "index_not_found",
            ApiError::IndexLoad(_) => "index_load_error",
            ApiError::QueryExecution(_) => "query_execution_error",
        }
    }
}

/// Only load and query failures can surface on the ask path; everything
/// else belongs to the background indexer and is folded into a query error.
impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::IndexLoad(msg) => ApiError::IndexLoad(msg),
            PipelineError::QueryExecution(msg) => ApiError::QueryExecution(msg),
            other => ApiError::QueryExecution(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert_eq!(ApiError::InvalidFileType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::EmptyUpload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::QuestionTooShort.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::FileNotFound("x.pdf".into()).status(),
            StatusCode::NOT_FOUND
        );
        let missing = ApiError::IndexNotFound {
            filename: "x.pdf".into(),
            detail: String::new(),
        };
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(missing.to_string().contains("re-upload"));
    }

    #[test]
    fn test_server_errors() {
        for err in [
            ApiError::StorageWrite("disk full".into()),
            ApiError::Metadata("locked".into()),
            ApiError::IndexScheduling("closed".into()),
            ApiError::IndexLoad("corrupt".into()),
            ApiError::QueryExecution("timeout".into()),
        ] {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let load: ApiError = PipelineError::IndexLoad("bad json".into()).into();
        assert_eq!(load.code(), "index_load_error");

        let query: ApiError = PipelineError::QueryExecution("503".into()).into();
        assert_eq!(query.code(), "query_execution_error");
        assert!(query.to_string().contains("503"));
    }
}
