/// Unified error types for Media Lounge
use crate::verification::VerificationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors (sqlite object store)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Verification code errors
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Object store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email, concurrent update)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload over the configured limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Record (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    /// Status code and stable error code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Authentication(_) | AppError::Jwt(_) => {
                (StatusCode::UNAUTHORIZED, "AuthenticationRequired")
            }
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            AppError::Verification(VerificationError::NotFound) => {
                (StatusCode::BAD_REQUEST, "VerificationNotFound")
            }
            AppError::Verification(VerificationError::Expired) => {
                (StatusCode::BAD_REQUEST, "VerificationExpired")
            }
            AppError::Verification(VerificationError::Mismatch) => {
                (StatusCode::BAD_REQUEST, "VerificationMismatch")
            }
            AppError::Verification(VerificationError::Cache(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge"),
            AppError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded")
            }
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::Serialization(_)
            | AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        }
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let message = match &self {
            AppError::RateLimitExceeded { .. } => "Rate limit exceeded".to_string(),
            AppError::Verification(VerificationError::NotFound)
            | AppError::Verification(VerificationError::Mismatch) => {
                "Invalid or expired verification code".to_string()
            }
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Request failed: {}", self);
                "Internal server error".to_string() // Don't leak details
            }
            AppError::Authentication(message)
            | AppError::Authorization(message)
            | AppError::Validation(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message)
            | AppError::PayloadTooLarge(message) => message.clone(),
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let AppError::RateLimitExceeded { retry_after } = self {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from(retry_after.as_secs().max(1)),
            );
        }
        response
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Verification(VerificationError::Expired).status_and_code(),
            (StatusCode::BAD_REQUEST, "VerificationExpired")
        );
        assert_eq!(
            AppError::Conflict("dup".into()).status_and_code().0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Storage("disk gone".into()).status_and_code().1,
            "InternalServerError"
        );
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = AppError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(3),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[axum::http::header::RETRY_AFTER], "3");
    }

    #[tokio::test]
    async fn test_client_errors_carry_bare_message() {
        let response = AppError::Validation("Missing required fields".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, "InvalidRequest");
        assert_eq!(parsed.message, "Missing required fields");
    }
}
