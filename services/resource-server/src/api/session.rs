//! Login endpoint handler.
//!
//! # Purpose
//! Verifies an identity's credential against the local identity provider and
//! issues an access token carrying its permission claims plus a claim-free
//! refresh token.
//!
//! # Security considerations
//! - Unknown identities, wrong credentials, and missing credentials all
//!   receive the same 401 body.
//! - Provider and signing errors are logged server-side and surface as 500.
use crate::api::error::{
    ApiError, api_internal, api_internal_message, api_unauthorized, api_validation_error,
};
use crate::api::types::{LoginRequest, LoginResponse};
use crate::app::AppState;
use crate::auth::wiring::LOCAL_PROVIDER;
use axum::Json;
use axum::extract::State;
use gatekeeper_authz::Permissions;

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identity_id = request.identity_id.trim();
    if identity_id.is_empty() {
        return Err(api_validation_error("identity_id is required"));
    }

    let identities = state
        .registry
        .identity_provider(LOCAL_PROVIDER)
        .ok_or_else(|| api_internal_message("identity provider not configured"))?;
    let identity = identities
        .verify(identity_id, &request.credential)
        .await
        .map_err(|err| api_internal("failed to verify identity", &err))?
        .ok_or_else(|| {
            tracing::info!(identity = identity_id, "login credential rejected");
            api_unauthorized("Not authenticated")
        })?;

    let permissions = match state.registry.permissions_provider(LOCAL_PROVIDER) {
        Some(provider) => provider
            .permissions(&identity.identity_id)
            .await
            .map_err(|err| api_internal("failed to load permissions", &err))?,
        None => Permissions::new(),
    };

    let access_token = state
        .registry
        .require_access_tokens()
        .map_err(|err| api_internal("access token provider missing", &err))?
        .issue(&identity.identity_id, permissions)
        .await
        .map_err(|err| api_internal("failed to issue access token", &err))?;
    let refresh_token = state
        .registry
        .require_refresh_tokens()
        .map_err(|err| api_internal("refresh token provider missing", &err))?
        .issue(&identity.identity_id, Permissions::new())
        .await
        .map_err(|err| api_internal("failed to issue refresh token", &err))?;

    tracing::info!(identity = %identity.identity_id, "issued tokens");
    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.access_ttl.as_secs(),
    }))
}
