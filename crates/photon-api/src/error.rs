//! API error handling
//!
//! Every failure leaves the service as `{"code": ..., "detail": ...}`.
//! The `detail` strings for auth failures are a client contract and must
//! not be reworded.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use photon_core::RepositoryError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub detail: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// 401: bad or missing credentials of any kind
    Unauthorized(String),
    /// 422: a public email/reset link that cannot be used
    UnprocessableToken(String),
    /// 403: role check failed
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// 503: revocation store or user store unreachable; retryable
    StoreUnavailable(String),
    Internal(String),
    Database(String),
}

impl AppError {
    pub fn detail(&self) -> &str {
        match self {
            AppError::Unauthorized(msg)
            | AppError::UnprocessableToken(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::StoreUnavailable(msg)
            | AppError::Internal(msg)
            | AppError::Database(msg) => msg,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::UnprocessableToken(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status().as_u16(), self.detail())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::UnprocessableToken(msg) => ApiError::new("UNPROCESSABLE_TOKEN", msg),
            AppError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::StoreUnavailable(_) => {
                ApiError::new("STORE_UNAVAILABLE", "Service temporarily unavailable")
            }
            AppError::Internal(_) => ApiError::new("INTERNAL_ERROR", "Internal server error"),
            AppError::Database(_) => {
                ApiError::new("DATABASE_ERROR", "Database operation failed")
            }
        };

        let mut response = (status, Json(error)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => AppError::NotFound("User not found".to_string()),
            RepositoryError::Conflict => AppError::Conflict(
                "An account with the same email address or username already exists".to_string(),
            ),
            RepositoryError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            RepositoryError::InvalidRole(role) => {
                AppError::Internal(format!("Stored role is not recognized: {role}"))
            }
            RepositoryError::Database(msg) => AppError::Database(msg),
        }
    }
}
