//! Axum middleware that runs an [`Authorizer`] in front of a route.
//!
//! # Purpose
//! Reads the `authentication` header, evaluates it against the endpoint's
//! rules, and either forwards the request with an [`AuthenticatedIdentity`]
//! extension or answers with the rejection's status and public message.
//!
//! # Security considerations
//! - Handlers behind this layer never run for rejected requests.
//! - Handlers that extract `Extension<AuthenticatedIdentity>` fail with a 500
//!   if the layer was not mounted, so a missing layer does not grant access.
use crate::api::error::ApiError;
use crate::observability::record_decision;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatekeeper_authz::{AUTHENTICATION_HEADER, Authorizer, Decision, Token};

/// Verified token for the current request; `None` on anonymous access to a
/// public endpoint.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub Option<Token>);

impl AuthenticatedIdentity {
    pub fn token(&self) -> Option<&Token> {
        self.0.as_ref()
    }
}

pub async fn authorize(
    State(authorizer): State<Authorizer>,
    mut request: Request,
    next: Next,
) -> Response {
    // Non-UTF-8 header values are treated as absent.
    let header = request
        .headers()
        .get(AUTHENTICATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match authorizer.evaluate(header.as_deref()).await {
        Decision::Authorized(token) => {
            record_decision(if token.is_some() {
                "authorized"
            } else {
                "anonymous"
            });
            request
                .extensions_mut()
                .insert(AuthenticatedIdentity(token));
            next.run(request).await
        }
        Decision::Rejected(rejection) => {
            record_decision(rejection.error().code());
            ApiError::from(rejection).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use gatekeeper_authz::{SecretMaterial, StaticSecretResolver, TokenCodec};
    use jsonwebtoken::Algorithm;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn codec() -> TokenCodec {
        let resolver = StaticSecretResolver::new(SecretMaterial::hmac(
            Algorithm::HS256,
            b"middleware-secret".to_vec(),
        ));
        TokenCodec::new(Arc::new(resolver), Algorithm::HS256)
    }

    async fn whoami(
        axum::Extension(identity): axum::Extension<AuthenticatedIdentity>,
    ) -> String {
        identity
            .token()
            .map(|token| token.identity_id().to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn router(authorizer: Authorizer) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn_with_state(authorizer, authorize))
    }

    async fn call(router: Router, header: Option<String>) -> (StatusCode, String) {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(value) = header {
            builder = builder.header(AUTHENTICATION_HEADER, value);
        }
        let response = router
            .oneshot(builder.body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    async fn bearer(codec: &TokenCodec, role: &str) -> String {
        let mut permissions = gatekeeper_authz::Permissions::new();
        permissions.insert("role".to_string(), serde_json::json!(role));
        let token = codec.create("u1", Duration::from_secs(60), "svc-a", permissions);
        format!("Bearer: {}", codec.encode(&token).await.expect("encode"))
    }

    #[tokio::test]
    async fn forwards_verified_identity_to_handler() {
        let codec = codec();
        let authorizer = Authorizer::builder(codec.clone())
            .allow_issuer("svc-a")
            .permission_equals("role", "admin")
            .build()
            .expect("authorizer");
        let (status, body) = call(router(authorizer), Some(bearer(&codec, "admin").await)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "u1");
    }

    #[tokio::test]
    async fn rejects_before_handler_runs() {
        let codec = codec();
        let authorizer = Authorizer::builder(codec.clone())
            .permission_equals("role", "admin")
            .build()
            .expect("authorizer");

        let (status, body) = call(router(authorizer.clone()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Not authenticated"));

        let (status, body) = call(router(authorizer), Some(bearer(&codec, "user").await)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("Not authorized"));
        assert!(!body.contains("role"));
    }

    #[tokio::test]
    async fn public_route_passes_anonymous_requests() {
        let authorizer = Authorizer::builder(codec())
            .open_to_public()
            .build()
            .expect("authorizer");
        let (status, body) = call(router(authorizer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }
}
