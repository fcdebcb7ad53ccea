use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::aggregator::DataSourceError;
use crate::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::Serialization(e) => AppError::Persistence(e.to_string()),
            RepositoryError::Corrupt(msg) => AppError::Persistence(msg),
        }
    }
}

impl From<DataSourceError> for AppError {
    fn from(err: DataSourceError) -> Self {
        match err {
            DataSourceError::Database(e) => AppError::Database(e),
            DataSourceError::Malformed(msg) => AppError::Persistence(msg),
        }
    }
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Persistence(msg) => {
                tracing::error!(error = %msg, "Persistence error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = if let Some(trace_id) = get_trace_id() {
            json!({
                "error": error_message,
                "status": status.as_u16(),
                "trace_id": trace_id,
            })
        } else {
            json!({
                "error": error_message,
                "status": status.as_u16(),
            })
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = AppError::Validation("name is required".to_string());
        assert_eq!(error.to_string(), "Validation error: name is required");
    }

    #[test]
    fn test_not_found_error() {
        let error = AppError::NotFound("Report".to_string());
        assert_eq!(error.to_string(), "Not found: Report");
    }

    #[test]
    fn test_conflict_from_repository() {
        let error: AppError = RepositoryError::Conflict("version mismatch".to_string()).into();
        assert!(matches!(error, AppError::Conflict(_)));
    }

    #[test]
    fn test_error_status_codes() {
        let test_cases = vec![
            (
                AppError::Validation("test".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::NotFound("test".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (AppError::Conflict("test".to_string()), StatusCode::CONFLICT),
            (
                AppError::Unauthorized("test".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::Persistence("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Storage("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Internal("test".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            let (status, _) = error.status_and_message();
            assert_eq!(status, expected_status);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let (_, message) = AppError::Internal("secret stack".to_string()).status_and_message();
        assert_eq!(message, "Internal server error");
    }

    #[test]
    fn test_into_response_sets_status() {
        let response = AppError::NotFound("Report 1 not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
