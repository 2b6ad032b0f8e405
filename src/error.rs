use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Application error type that converts to HTTP responses.
///
/// Credential failures collapse into the single `InvalidCredentials` variant so
/// the response never reveals whether the email existed.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    Conflict,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone())),
            AppError::Conflict => (StatusCode::CONFLICT, "conflict", Some(self.to_string())),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "unauthorized", Some(self.to_string())),
            AppError::RefreshTokenNotFound | AppError::RefreshTokenExpired => {
                (StatusCode::UNAUTHORIZED, "unauthorized", Some(self.to_string()))
            }
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "not_found", Some(self.to_string())),
            AppError::Integrity(msg) => {
                error!(error = %msg, "integrity violation");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Database(msg) => {
                error!(error = %msg, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for services and handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        let resp = AppError::Conflict.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn credential_and_refresh_errors_map_to_401() {
        for err in [
            AppError::InvalidCredentials,
            AppError::RefreshTokenNotFound,
            AppError::RefreshTokenExpired,
        ] {
            let resp = err.into_response();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn user_not_found_maps_to_404() {
        let resp = AppError::UserNotFound.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn integrity_and_database_errors_are_opaque_500s() {
        for err in [
            AppError::Integrity("refresh_tokens_pkey".into()),
            AppError::Database("connection reset".into()),
        ] {
            let resp = err.into_response();
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn refresh_errors_keep_distinct_messages() {
        assert_eq!(
            AppError::RefreshTokenNotFound.to_string(),
            "Refresh token not found"
        );
        assert_eq!(
            AppError::RefreshTokenExpired.to_string(),
            "Refresh token expired"
        );
    }
}
