use axum::Router;
use axum::body::Body;
use axum::http::Request;
use gatekeeper_authz::credential_digest;
use resource_server::app::{build_router, build_state};
use resource_server::config::{ResourceServerConfig, UserRecord};
use std::time::Duration;

pub const ISSUER: &str = "gatekeeper";
pub const SECRET: &str = "integration-secret";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_request(uri: &str, authentication: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(value) = authentication {
        builder = builder.header("authentication", value);
    }
    builder.body(Body::empty()).expect("request")
}

/// Login credential of every seeded user except `carol`.
pub fn credential_for(identity_id: &str) -> String {
    format!("{identity_id}-credential")
}

fn user(identity_id: &str, role: &str, with_credential: bool) -> UserRecord {
    let mut permissions = gatekeeper_authz::Permissions::new();
    permissions.insert("role".to_string(), serde_json::json!(role));
    UserRecord {
        identity_id: identity_id.to_string(),
        display_name: identity_id.to_uppercase(),
        credential_sha256: with_credential.then(|| credential_digest(&credential_for(identity_id))),
        permissions,
    }
}

pub fn test_config() -> ResourceServerConfig {
    ResourceServerConfig {
        bind_addr: "127.0.0.1:0".parse().expect("bind"),
        metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
        issuer: ISSUER.to_string(),
        trusted_issuers: vec![ISSUER.to_string()],
        secret: SECRET.to_string(),
        access_ttl: Duration::from_secs(300),
        refresh_ttl: Duration::from_secs(3600),
        leeway_secs: 0,
        users: vec![
            user("alice", "admin", true),
            user("bob", "user", true),
            user("carol", "admin", false),
        ],
    }
}

pub fn test_app(config: &ResourceServerConfig) -> Router {
    let (state, authorizers) = build_state(config).expect("state");
    build_router(state, authorizers)
}
