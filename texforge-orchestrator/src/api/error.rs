//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::dispatcher::{DispatchError, ValidationError};
use crate::queue::QueueError;
use texforge_core::dto::job::CapacityRejection;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    TooManyRequests(String),
    /// Admission ceiling reached; rendered with the running-task snapshot
    Overloaded(CapacityRejection),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Overloaded(rejection) => {
                return (StatusCode::SERVICE_UNAVAILABLE, Json(rejection)).into_response();
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(err) => err.into(),
            DispatchError::Capacity(rejection) => ApiError::Overloaded(rejection),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueFull => ApiError::TooManyRequests(err.to_string()),
            QueueError::Validation(err) => err.into(),
            QueueError::NotFound | QueueError::ArtifactNotFound => {
                ApiError::NotFound(err.to_string())
            }
            QueueError::SavePayload(ref source) => {
                tracing::error!("Failed to save queued payload: {}", source);
                ApiError::InternalError(err.to_string())
            }
            QueueError::Store(ref source) => {
                tracing::error!("Shared store error: {}", source);
                ApiError::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        tracing::debug!("Rejected multipart body: {}", err);
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge("File too large".to_string());
        }
        ApiError::BadRequest("Failed to parse form".to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::StoreError;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let (status, body) = render(ValidationError::UnsupportedType.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Only ZIP and .tex files are allowed");
    }

    #[tokio::test]
    async fn test_capacity_rejection_carries_running_tasks() {
        let rejection = CapacityRejection::new(5, Vec::new());
        let (status, body) = render(DispatchError::Capacity(rejection).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Server overloaded");
        assert_eq!(body["message"], "Maximum 5 concurrent compilations reached");
        assert!(body["running_tasks"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queue_errors() {
        let (status, body) = render(QueueError::QueueFull.into()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Queue is full, try again later");

        let (status, body) = render(QueueError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Request not found or expired");

        let err = QueueError::Store(StoreError::Unavailable("down".into()));
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }
}
