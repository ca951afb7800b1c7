use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

use super::{ApiResponse, FieldErrors};
use crate::services::{AuthError, UserAdminError};

#[derive(Debug)]
pub enum ApiError {
    InvalidCredentials,

    Unauthenticated,

    Forbidden(String),

    NotFound(String),

    Conflict(String),

    /// Malformed input, 400.
    Validation { message: String, errors: FieldErrors },

    /// Well-formed input the domain refuses, 422.
    Unprocessable { message: String, errors: FieldErrors },

    TooManyAttempts { retry_after_secs: u64 },

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::Validation { message, .. } => write!(f, "Validation error: {message}"),
            Self::Unprocessable { message, .. } => write!(f, "Unprocessable: {message}"),
            Self::TooManyAttempts { retry_after_secs } => {
                write!(f, "Too many attempts, retry after {retry_after_secs}s")
            }
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ApiResponse::<()>::error("Invalid credentials"),
            ),
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ApiResponse::error("Unauthenticated"),
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiResponse::error(msg)),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ApiResponse::error(msg)),
            Self::Conflict(msg) => (StatusCode::CONFLICT, ApiResponse::error(msg)),
            Self::Validation { message, errors } => {
                (StatusCode::BAD_REQUEST, with_fields(message, errors))
            }
            Self::Unprocessable { message, errors } => {
                (StatusCode::UNPROCESSABLE_ENTITY, with_fields(message, errors))
            }
            Self::TooManyAttempts { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ApiResponse::<()>::error(
                        "Too many login attempts, try again later",
                    )),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return response;
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("A database error occurred"),
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error("An internal error occurred"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn with_fields(message: String, errors: FieldErrors) -> ApiResponse<()> {
    if errors.is_empty() {
        ApiResponse::error(message)
    } else {
        ApiResponse::error_with_fields(message, errors)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert("body".to_string(), rejection.body_text());
        Self::Validation {
            message: "Validation error".to_string(),
            errors,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::InvalidResetCode => Self::validation_message(err.to_string()),
            AuthError::Forbidden(msg) => Self::Forbidden(msg),
            AuthError::TooManyAttempts { retry_after_secs } => {
                Self::TooManyAttempts { retry_after_secs }
            }
            AuthError::WeakPassword(msg) => Self::unprocessable(msg),
            AuthError::IncorrectPassword => Self::unprocessable(err.to_string()),
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<UserAdminError> for ApiError {
    fn from(err: UserAdminError) -> Self {
        match err {
            UserAdminError::NotFound => Self::NotFound(err.to_string()),
            UserAdminError::Conflict => Self::Conflict(err.to_string()),
            UserAdminError::LastActiveAdmin | UserAdminError::InactiveUser => {
                Self::unprocessable(err.to_string())
            }
            UserAdminError::Database(msg) => Self::DatabaseError(msg),
            UserAdminError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl ApiError {
    /// 400 with per-field messages.
    pub fn validation(errors: FieldErrors) -> Self {
        Self::Validation {
            message: "Validation error".to_string(),
            errors,
        }
    }

    /// 400 with a message and no field map.
    pub fn validation_message(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            errors: FieldErrors::new(),
        }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::Unprocessable {
            message: msg.into(),
            errors: FieldErrors::new(),
        }
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("Forbidden".to_string())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
