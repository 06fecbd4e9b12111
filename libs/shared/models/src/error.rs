use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error on {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("Outside availability: {0}")]
    OutsideAvailability(String),

    #[error("Slot conflict: {0}")]
    SlotConflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::OutsideAvailability(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SlotConflict(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code rendered next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "NotFound",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Internal(_) => "InternalError",
            AppError::Database(_) => "DatabaseError",
            AppError::ValidationError { .. } => "ValidationError",
            AppError::OutsideAvailability(_) => "OutsideAvailabilityError",
            AppError::SlotConflict(_) => "SlotConflictError",
            AppError::InvalidTransition(_) => "InvalidTransitionError",
            AppError::Unavailable(_) => "ServiceUnavailable",
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::ValidationError { field, message } => json!({
                "error": message,
                "code": self.code(),
                "field": field,
            }),
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg)
            | AppError::Database(msg)
            | AppError::OutsideAvailability(msg)
            | AppError::SlotConflict(msg)
            | AppError::InvalidTransition(msg)
            | AppError::Unavailable(msg) => json!({
                "error": msg,
                "code": self.code(),
            }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self);
        } else {
            tracing::warn!("Request rejected: {}: {}", status, self);
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_errors_map_to_distinct_statuses() {
        assert_eq!(AppError::SlotConflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::OutsideAvailability("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::validation("duration_minutes", "x").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validation_body_carries_field() {
        let body = AppError::validation("start_time", "in the past").body();
        assert_eq!(body["field"], "start_time");
        assert_eq!(body["code"], "ValidationError");
    }
}
