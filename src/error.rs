// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

const TRY_AGAIN: &str = "Something went wrong. Please try again.";

/// Global Application Error Enum.
/// Centralizes the ledger's error taxonomy and its mapping to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 400 Bad Request
    #[error("{0}")]
    Validation(String),

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidScore(i32),

    #[error("You cannot rate yourself")]
    SelfRatingDenied,

    #[error("Amount must be between 1 and {max}, got {amount}")]
    InvalidAmount { amount: i64, max: i64 },

    // 401 Unauthorized
    #[error("{0}")]
    Unauthenticated(String),

    // 403 Forbidden
    #[error("{0}")]
    Unauthorized(String),

    #[error("You cannot book your own ride or request")]
    SelfBookingDenied,

    // 404 Not Found
    #[error("{0}")]
    NotFound(String),

    // 409 Conflict
    #[error("Only {remaining} seat(s) left, {requested} requested")]
    CapacityExceeded { requested: i32, remaining: i32 },

    #[error("Cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("You have already rated this user for this trip")]
    DuplicateRating,

    #[error("{0}")]
    Conflict(String),

    // 422 Unprocessable Entity
    #[error("Insufficient funds: balance is {balance}, {requested} requested")]
    InsufficientFunds { balance: i64, requested: i64 },

    // 500 Internal Server Error
    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // 503 Service Unavailable
    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),
}

impl AppError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::InvalidScore(_) => "invalid_score",
            AppError::SelfRatingDenied => "self_rating_denied",
            AppError::InvalidAmount { .. } => "invalid_amount",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Unauthorized(_) => "authorization_error",
            AppError::SelfBookingDenied => "self_booking_denied",
            AppError::NotFound(_) => "not_found",
            AppError::CapacityExceeded { .. } => "capacity_exceeded",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::DuplicateRating => "duplicate_rating",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::Consistency(_) => "consistency_error",
            AppError::Internal(_) => "internal_error",
            AppError::TransientStore(_) => "transient_store_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidScore(_)
            | AppError::SelfRatingDenied
            | AppError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) | AppError::SelfBookingDenied => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CapacityExceeded { .. }
            | AppError::InvalidTransition { .. }
            | AppError::DuplicateRating
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Consistency(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Only transient store failures are retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Consistency(msg) => {
                tracing::error!(kind = self.kind(), "Consistency violation: {}", msg);
                TRY_AGAIN.to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(kind = self.kind(), "Internal Server Error: {}", msg);
                TRY_AGAIN.to_string()
            }
            AppError::TransientStore(msg) => {
                tracing::warn!(kind = self.kind(), "Transient store failure: {}", msg);
                TRY_AGAIN.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError`.
/// Allows using `?` operator on database queries; contention and connectivity
/// failures become retryable.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::TransientStore(err.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => AppError::TransientStore(err.to_string()),
                Some("23505") => AppError::Conflict(db_err.message().to_string()),
                _ => AppError::Internal(err.to_string()),
            },
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
