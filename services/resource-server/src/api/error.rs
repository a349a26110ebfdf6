//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction to keep error shapes uniform
//! across resource-server endpoints, including authorization rejections.
//!
//! # Key invariants and assumptions
//! - Error responses must include a stable `code` and human-readable `message`.
//! - Status codes must align with the error category.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
//! - Authorization rejections carry only the public message; the failing
//!   issuer or permission is never echoed back.
use crate::api::types::ErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use gatekeeper_authz::{AuthzError, Rejection};

/// Structured API error returned by handlers and the authorization
/// middleware.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        api_from_authz(rejection.error())
    }
}

/// Map an authorization failure onto its status and public message.
pub fn api_from_authz(err: &AuthzError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ApiError {
        status,
        body: ErrorResponse {
            code: err.code().to_string(),
            message: err.public_message().to_string(),
        },
    }
}

/// Build a 500 Internal Server Error, logging the underlying cause.
pub fn api_internal(message: &str, err: &AuthzError) -> ApiError {
    tracing::error!(error = %err, "resource server internal error");
    api_internal_message(message)
}

/// Build a 500 Internal Server Error without an underlying error to log.
pub fn api_internal_message(message: &str) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            code: "internal".to_string(),
            message: message.to_string(),
        },
    }
}

/// Build a 401 Unauthorized error.
pub fn api_unauthorized(message: &str) -> ApiError {
    ApiError {
        status: StatusCode::UNAUTHORIZED,
        body: ErrorResponse {
            code: "unauthorized".to_string(),
            message: message.to_string(),
        },
    }
}

/// Build a 400 Bad Request validation error.
pub fn api_validation_error(message: &str) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        body: ErrorResponse {
            code: "validation_error".to_string(),
            message: message.to_string(),
        },
    }
}
