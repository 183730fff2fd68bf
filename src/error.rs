/// Unified error types for the marketplace service
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
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors (missing or invalid credentials)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Caller is authenticated but does not own the resource or lacks a role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., phone number already registered)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Monthly publish quota of the caller's plan is exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The reporter already filed a signal against this listing
    #[error("Duplicate report: {0}")]
    DuplicateReport(String),

    /// Requested status change is not allowed from the current status
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Account disabled by an administrator
    #[error("Account suspended: {0}")]
    AccountSuspended(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    /// Machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) | AppError::Jwt(_) => "AuthenticationRequired",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Validation(_) => "InvalidRequest",
            AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::QuotaExceeded(_) => "QuotaExceeded",
            AppError::DuplicateReport(_) => "DuplicateReport",
            AppError::InvalidTransition(_) => "InvalidTransition",
            AppError::AccountSuspended(_) => "AccountSuspended",
            AppError::RateLimitExceeded { .. } => "RateLimitExceeded",
            AppError::Database(_) | AppError::Internal(_) | AppError::Io(_) => {
                "InternalServerError"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AccountSuspended(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_)
            | AppError::QuotaExceeded(_)
            | AppError::DuplicateReport(_)
            | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Internal(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database failure: {}", e);
                "Internal server error".to_string() // Don't leak details
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal failure: {}", e);
                "Internal server error".to_string()
            }
            AppError::Io(ref e) => {
                tracing::error!("IO failure: {}", e);
                "Internal server error".to_string()
            }
            AppError::RateLimitExceeded { .. } => "Rate limit exceeded".to_string(),
            ref other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;

/// True when SQLite rejected a write because another connection holds the lock
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some("5") | Some("6") | Some("517") | Some("262")
        ),
        _ => false,
    }
}

/// True when an insert hit a UNIQUE constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_statuses() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::QuotaExceeded("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::DuplicateReport("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::InvalidTransition("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = AppError::Internal("secret path /var/db".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_codes_are_distinct_for_domain_errors() {
        assert_eq!(AppError::QuotaExceeded("x".into()).code(), "QuotaExceeded");
        assert_eq!(AppError::DuplicateReport("x".into()).code(), "DuplicateReport");
        assert_eq!(AppError::InvalidTransition("x".into()).code(), "InvalidTransition");
    }
}
