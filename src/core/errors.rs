use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failures raised while indexing documents or answering a question.
///
/// Everything except `Configuration` is recoverable: extraction failures
/// skip a page, embedding failures skip a document and generation failures
/// degrade the answer to excerpts.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("vector store error: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("document processing is already running")]
    ProcessingInProgress,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        RagError::Store(err.to_string())
    }

    pub fn extraction<E: std::fmt::Display>(err: E) -> Self {
        RagError::Extraction(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::EmbeddingUnavailable(_) | RagError::Timeout(_) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            RagError::Configuration(msg) => ApiError::BadRequest(msg),
            RagError::ProcessingInProgress => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_outage_maps_to_service_unavailable() {
        let api: ApiError = RagError::EmbeddingUnavailable("connection refused".into()).into();
        assert!(matches!(api, ApiError::ServiceUnavailable(_)));
        assert_eq!(
            api.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn configuration_error_maps_to_bad_request() {
        let api: ApiError = RagError::Configuration("chunk_size must be positive".into()).into();
        assert!(matches!(api, ApiError::BadRequest(ref msg) if msg.contains("chunk_size")));
    }

    #[test]
    fn concurrent_processing_maps_to_conflict() {
        let api: ApiError = RagError::ProcessingInProgress.into();
        assert_eq!(api.into_response().status(), StatusCode::CONFLICT);
    }
}
