use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Caller identity missing or malformed")]
    Unauthenticated,
    #[error("Access denied")]
    AccessDenied,
    #[error("Messages can only be edited within {0} minutes of sending")]
    EditWindowExpired(i64),
    #[error("Messages can only be deleted for everyone within {0} minutes of sending")]
    DeleteWindowExpired(i64),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Status change not allowed: {0}")]
    InvalidStatusTransition(String),
    #[error("Transient store error: {0}")]
    TransientStore(String),
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
    #[error("Database error: {0}")]
    Database(sqlx::Error),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::EditWindowExpired(_) => "EDIT_WINDOW_EXPIRED",
            Self::DeleteWindowExpired(_) => "DELETE_WINDOW_EXPIRED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidStatusTransition(_) => "INVALID_STATUS_TRANSITION",
            Self::TransientStore(_) => "TRANSIENT_STORE_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Database(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same store operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::EditWindowExpired(_) | Self::DeleteWindowExpired(_) | Self::InvalidStatusTransition(_) => {
                StatusCode::CONFLICT
            }
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::TransientStore(_) | Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::TransientStore(e.to_string()),
            // serialization_failure, deadlock_detected
            sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("40001" | "40P01")) => {
                Self::TransientStore(e.to_string())
            }
            _ => Self::Database(e),
        }
    }
}

impl AppError {
    /// Message safe to show a client. Store and internal failures are logged here and masked.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "Internal server error".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error occurred");
                "Internal server error".to_string()
            }
            Self::TransientStore(msg) => {
                tracing::warn!(message = %msg, "Transient store error reached the caller");
                "Service temporarily unavailable".to_string()
            }
            other => {
                tracing::debug!(code = other.code(), error = %other, "Request rejected");
                other.to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.code(),
            "error": self.public_message()
        }));

        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::NotFound("Conversation").code(), "NOT_FOUND");
        assert_eq!(AppError::EditWindowExpired(15).code(), "EDIT_WINDOW_EXPIRED");
        assert_eq!(AppError::DeleteWindowExpired(60).code(), "DELETE_WINDOW_EXPIRED");
        assert_eq!(AppError::Validation("blank".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AccessDenied.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn only_store_hiccups_are_transient() {
        assert!(AppError::TransientStore("deadlock".into()).is_transient());
        assert!(AppError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!AppError::from(sqlx::Error::RowNotFound).is_transient());
        assert!(!AppError::AccessDenied.is_transient());
        assert!(!AppError::ServiceUnavailable.is_transient());
    }
}
