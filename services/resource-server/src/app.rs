//! Resource-server HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, mounts one authorization layer per endpoint class,
//! and defines the shared application state injected into handlers.
//!
//! # Notes
//! This module centralizes route composition to keep `main` small and testable.
use crate::api;
use crate::auth::middleware::authorize;
use crate::auth::wiring::{self, EndpointAuthorizers};
use crate::config::ResourceServerConfig;
use axum::Router;
use axum::middleware::from_fn_with_state;
use gatekeeper_authz::{AuthzResult, Registry};
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub access_ttl: Duration,
}

/// Build the state and authorizers described by `config`.
pub fn build_state(config: &ResourceServerConfig) -> AuthzResult<(AppState, EndpointAuthorizers)> {
    let (resolver, codec) = wiring::build_codec(config);
    let registry = wiring::build_registry(config, resolver, &codec)?;
    let authorizers = wiring::build_authorizers(config, &codec)?;
    Ok((
        AppState {
            registry,
            access_ttl: config.access_ttl,
        },
        authorizers,
    ))
}

pub fn build_router(state: AppState, authorizers: EndpointAuthorizers) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    let public_routes = Router::new()
        .route("/info", axum::routing::get(api::resources::info))
        .layer(from_fn_with_state(authorizers.public, authorize));
    let admin_routes = Router::new()
        .route(
            "/api/protectedEndPoint",
            axum::routing::get(api::resources::protected_endpoint),
        )
        .layer(from_fn_with_state(authorizers.admin, authorize));

    Router::new()
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route("/login", axum::routing::post(api::session::login))
        .merge(public_routes)
        .merge(admin_routes)
        .layer(trace_layer)
        .with_state(state)
}
