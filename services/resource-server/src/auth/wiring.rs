//! Startup wiring for the token codec, provider registry, and endpoint
//! authorizers.
//!
//! # Purpose
//! Turns a validated [`ResourceServerConfig`] into the authorization objects
//! the router needs. Everything built here is immutable and shared by clone.
use crate::config::ResourceServerConfig;
use gatekeeper_authz::{
    Authorizer, AuthzResult, CodecTokenProvider, Identity, InMemoryIdentityProvider,
    InMemoryPermissionsProvider, Registry, SecretMaterial, SecretResolver, StaticSecretResolver,
    TokenCodec, TokenKind,
};
use jsonwebtoken::Algorithm;
use std::sync::Arc;

/// Name under which the config-backed identity and permissions providers are
/// registered.
pub const LOCAL_PROVIDER: &str = "local";

/// Permission and value required by the protected endpoint.
pub const ADMIN_PERMISSION: &str = "role";
pub const ADMIN_ROLE: &str = "admin";

/// One authorizer per class of endpoint.
#[derive(Clone)]
pub struct EndpointAuthorizers {
    /// Token optional; a verified token is still held to the issuer list.
    pub public: Authorizer,
    /// Requires a trusted issuer and `role == "admin"`.
    pub admin: Authorizer,
}

pub fn build_codec(config: &ResourceServerConfig) -> (Arc<dyn SecretResolver>, TokenCodec) {
    let resolver: Arc<dyn SecretResolver> = Arc::new(StaticSecretResolver::new(
        SecretMaterial::hmac(Algorithm::HS256, config.secret.as_bytes().to_vec()),
    ));
    let codec =
        TokenCodec::new(resolver.clone(), Algorithm::HS256).with_leeway(config.leeway_secs);
    (resolver, codec)
}

pub fn build_registry(
    config: &ResourceServerConfig,
    resolver: Arc<dyn SecretResolver>,
    codec: &TokenCodec,
) -> AuthzResult<Registry> {
    let mut identities = InMemoryIdentityProvider::new(config.users.iter().map(|user| Identity {
        identity_id: user.identity_id.clone(),
        display_name: user.display_name.clone(),
    }));
    for user in &config.users {
        if let Some(digest) = &user.credential_sha256 {
            identities = identities.with_credential_digest(&user.identity_id, digest)?;
        }
    }
    let permissions = InMemoryPermissionsProvider::new(
        config
            .users
            .iter()
            .map(|user| (user.identity_id.clone(), user.permissions.clone())),
    );

    let mut builder = Registry::builder();
    builder
        .set_secret_resolver(resolver)
        .set_access_token_provider(Arc::new(CodecTokenProvider::new(
            codec.clone(),
            config.issuer.clone(),
            config.access_ttl,
        )))
        .set_refresh_token_provider(Arc::new(
            CodecTokenProvider::new(codec.clone(), config.issuer.clone(), config.refresh_ttl)
                .with_kind(TokenKind::Refresh),
        ))
        .add_identity_provider(LOCAL_PROVIDER, Arc::new(identities))
        .add_permissions_provider(LOCAL_PROVIDER, Arc::new(permissions));
    Ok(builder.build())
}

pub fn build_authorizers(
    config: &ResourceServerConfig,
    codec: &TokenCodec,
) -> AuthzResult<EndpointAuthorizers> {
    let public = Authorizer::builder(codec.clone())
        .open_to_public()
        .allow_issuers(config.trusted_issuers.iter().cloned())
        .build()?;
    let admin = Authorizer::builder(codec.clone())
        .allow_issuers(config.trusted_issuers.iter().cloned())
        .permission_equals(ADMIN_PERMISSION, ADMIN_ROLE)
        .build()?;
    Ok(EndpointAuthorizers { public, admin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserRecord;
    use gatekeeper_authz::credential_digest;
    use std::time::Duration;

    fn config() -> ResourceServerConfig {
        let mut permissions = gatekeeper_authz::Permissions::new();
        permissions.insert("role".to_string(), serde_json::json!("admin"));
        ResourceServerConfig {
            bind_addr: "127.0.0.1:0".parse().expect("bind"),
            metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
            issuer: "svc-a".to_string(),
            trusted_issuers: vec!["svc-a".to_string()],
            secret: "wiring-secret".to_string(),
            access_ttl: Duration::from_secs(60),
            refresh_ttl: Duration::from_secs(600),
            leeway_secs: 5,
            users: vec![UserRecord {
                identity_id: "alice".to_string(),
                display_name: "Alice".to_string(),
                credential_sha256: Some(credential_digest("alice-pw")),
                permissions,
            }],
        }
    }

    #[test]
    fn codec_uses_configured_leeway() {
        let (_, codec) = build_codec(&config());
        assert_eq!(codec.algorithm(), Algorithm::HS256);
        assert_eq!(codec.leeway(), 5);
    }

    #[tokio::test]
    async fn registry_serves_configured_users() {
        let config = config();
        let (resolver, codec) = build_codec(&config);
        let registry = build_registry(&config, resolver, &codec).expect("registry");
        assert_eq!(registry.identity_provider_names(), vec![LOCAL_PROVIDER]);

        let identities = registry.identity_provider(LOCAL_PROVIDER).expect("identities");
        let identity = identities
            .verify("alice", "alice-pw")
            .await
            .expect("verify")
            .expect("alice");
        assert_eq!(identity.display_name, "Alice");
        assert!(identities.verify("alice", "guess").await.expect("verify").is_none());

        let permissions = registry
            .permissions_provider(LOCAL_PROVIDER)
            .expect("permissions")
            .permissions("alice")
            .await
            .expect("lookup");
        assert_eq!(permissions["role"], serde_json::json!("admin"));
    }

    #[tokio::test]
    async fn issued_access_token_passes_admin_authorizer() {
        let config = config();
        let (resolver, codec) = build_codec(&config);
        let registry = build_registry(&config, resolver, &codec).expect("registry");
        let authorizers = build_authorizers(&config, &codec).expect("authorizers");

        let mut permissions = gatekeeper_authz::Permissions::new();
        permissions.insert("role".to_string(), serde_json::json!("admin"));
        let encoded = registry
            .require_access_tokens()
            .expect("access tokens")
            .issue("alice", permissions)
            .await
            .expect("issue");
        let header = format!("Bearer: {encoded}");
        assert!(authorizers.admin.evaluate(Some(&header)).await.is_authorized());
        assert!(!authorizers.admin.is_public());
        assert!(authorizers.public.is_public());
    }

    #[test]
    fn malformed_credential_digest_fails_registry_build() {
        let mut config = config();
        config.users[0].credential_sha256 = Some("not-hex".to_string());
        let (resolver, codec) = build_codec(&config);
        assert!(build_registry(&config, resolver, &codec).is_err());
    }

    #[tokio::test]
    async fn refresh_tokens_do_not_pass_authorizers() {
        let config = config();
        let (resolver, codec) = build_codec(&config);
        let registry = build_registry(&config, resolver, &codec).expect("registry");
        let authorizers = build_authorizers(&config, &codec).expect("authorizers");

        let mut permissions = gatekeeper_authz::Permissions::new();
        permissions.insert("role".to_string(), serde_json::json!("admin"));
        let encoded = registry
            .require_refresh_tokens()
            .expect("refresh tokens")
            .issue("alice", permissions)
            .await
            .expect("issue");
        let header = format!("Bearer: {encoded}");
        assert!(!authorizers.admin.evaluate(Some(&header)).await.is_authorized());
    }
}
