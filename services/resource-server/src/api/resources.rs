//! Handlers for routes guarded by an authorizer.
//!
//! # Purpose and responsibility
//! `/info` reports who the caller is (or that they are anonymous) and
//! `/api/protectedEndPoint` serves administrators only. The access rules live
//! in the middleware layers mounted by the router; these handlers only read
//! the [`AuthenticatedIdentity`] it attaches.
use crate::api::error::{ApiError, api_unauthorized};
use crate::api::types::{InfoResponse, ProtectedResponse};
use crate::auth::middleware::AuthenticatedIdentity;
use axum::{Extension, Json};

pub async fn info(Extension(identity): Extension<AuthenticatedIdentity>) -> Json<InfoResponse> {
    let token = identity.token();
    Json(InfoResponse {
        authenticated: token.is_some(),
        identity_id: token.map(|token| token.identity_id().to_string()),
        issuer: token.map(|token| token.issuer().to_string()),
    })
}

pub async fn protected_endpoint(
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Result<Json<ProtectedResponse>, ApiError> {
    // The admin authorizer is private, so a token is always present here.
    let token = identity
        .token()
        .ok_or_else(|| api_unauthorized("Not authenticated"))?;
    Ok(Json(ProtectedResponse {
        identity_id: token.identity_id().to_string(),
        message: "access granted".to_string(),
    }))
}
