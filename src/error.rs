//! Error types for the circulation desk server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchEntity = 4,
    Duplicate = 5,
    MaxBorrowsReached = 6,
    NotAvailable = 7,
    NotBorrowed = 8,
    BadValue = 9,
    Busy = 10,
    TooManyRequests = 11,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another request holds the lock on the same patron or book.
    /// The caller may retry.
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Borrow limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Not borrowed: {0}")]
    NotBorrowed(String),

    #[error("Too many requests: {0}")]
    RateLimited(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and error code for this error
    pub fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchEntity),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Conflict(_) => (StatusCode::BAD_REQUEST, ErrorCode::Duplicate),
            AppError::Busy(_) => (StatusCode::BAD_REQUEST, ErrorCode::Busy),
            AppError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, ErrorCode::MaxBorrowsReached),
            AppError::Unavailable(_) => (StatusCode::BAD_REQUEST, ErrorCode::NotAvailable),
            AppError::NotBorrowed(_) => (StatusCode::BAD_REQUEST, ErrorCode::NotBorrowed),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, ErrorCode::TooManyRequests),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Busy(msg)
            | AppError::LimitExceeded(msg)
            | AppError::Unavailable(msg)
            | AppError::NotBorrowed(msg)
            | AppError::RateLimited(msg) => msg,
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
