//! Composition root for token, secret, identity, and permissions providers.
//!
//! # Purpose
//! A [`RegistryBuilder`] collects providers during process startup and
//! produces immutable [`Registry`] snapshots. Components receive the snapshot
//! by injection; there is no global lookup.
//!
//! # Key invariants
//! - A snapshot never changes after [`RegistryBuilder::build`] returns.
//! - The builder can be mutated and built again; earlier snapshots are not
//!   affected.
//! - No completeness validation happens at build time; callers check for the
//!   providers they need.
use crate::secret::SecretResolver;
use crate::token::{Permissions, TokenCodec, TokenKind};
use crate::{AuthzError, AuthzResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Issues signed tokens (access or refresh) for an identity.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue(&self, identity_id: &str, permissions: Permissions) -> AuthzResult<String>;
}

/// A user record as known to an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub identity_id: String,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identity(&self, identity_id: &str) -> AuthzResult<Option<Identity>>;

    /// The identity, only if `credential` proves it. Unknown identities and
    /// wrong credentials both yield `None`.
    async fn verify(&self, identity_id: &str, credential: &str) -> AuthzResult<Option<Identity>>;
}

#[async_trait]
pub trait PermissionsProvider: Send + Sync {
    /// Permission claims for an identity; unknown identities yield an empty map.
    async fn permissions(&self, identity_id: &str) -> AuthzResult<Permissions>;
}

/// [`TokenProvider`] backed by a [`TokenCodec`] with a fixed issuer, TTL, and
/// token kind (access unless [`with_kind`](Self::with_kind) says otherwise).
#[derive(Clone)]
pub struct CodecTokenProvider {
    codec: TokenCodec,
    issuer: String,
    ttl: Duration,
    kind: TokenKind,
}

impl CodecTokenProvider {
    pub fn new(codec: TokenCodec, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            codec,
            issuer: issuer.into(),
            ttl,
            kind: TokenKind::Access,
        }
    }

    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl TokenProvider for CodecTokenProvider {
    async fn issue(&self, identity_id: &str, permissions: Permissions) -> AuthzResult<String> {
        let token = self
            .codec
            .create(identity_id, self.ttl, self.issuer.clone(), permissions)
            .with_kind(self.kind);
        self.codec.encode(&token).await
    }
}

/// Hex-encoded SHA-256 of a credential, the form
/// [`InMemoryIdentityProvider::with_credential_digest`] stores.
pub fn credential_digest(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

#[derive(Debug, Clone)]
struct LocalIdentity {
    identity: Identity,
    digest: Option<[u8; 32]>,
}

/// Read-only identity directory. Identities without a credential digest can
/// be looked up but never verified.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    identities: HashMap<String, LocalIdentity>,
}

impl InMemoryIdentityProvider {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            identities: identities
                .into_iter()
                .map(|identity| {
                    (
                        identity.identity_id.clone(),
                        LocalIdentity {
                            identity,
                            digest: None,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Attach the hex SHA-256 digest of an identity's credential.
    pub fn with_credential_digest(
        mut self,
        identity_id: &str,
        sha256_hex: &str,
    ) -> AuthzResult<Self> {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(sha256_hex.trim(), &mut digest).map_err(|err| {
            AuthzError::Configuration(format!("credential digest for {identity_id}: {err}"))
        })?;
        let entry = self.identities.get_mut(identity_id).ok_or_else(|| {
            AuthzError::Configuration(format!("credential for unknown identity {identity_id}"))
        })?;
        entry.digest = Some(digest);
        Ok(self)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn identity(&self, identity_id: &str) -> AuthzResult<Option<Identity>> {
        Ok(self
            .identities
            .get(identity_id)
            .map(|entry| entry.identity.clone()))
    }

    async fn verify(&self, identity_id: &str, credential: &str) -> AuthzResult<Option<Identity>> {
        let presented = Sha256::digest(credential.as_bytes());
        let Some(entry) = self.identities.get(identity_id) else {
            return Ok(None);
        };
        let Some(expected) = entry.digest else {
            return Ok(None);
        };
        // Compare every byte so timing does not reveal the matching prefix.
        let diff = expected
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok((diff == 0).then(|| entry.identity.clone()))
    }
}

/// Read-only permission sets keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPermissionsProvider {
    permissions: HashMap<String, Permissions>,
}

impl InMemoryPermissionsProvider {
    pub fn new(permissions: impl IntoIterator<Item = (String, Permissions)>) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PermissionsProvider for InMemoryPermissionsProvider {
    async fn permissions(&self, identity_id: &str) -> AuthzResult<Permissions> {
        Ok(self
            .permissions
            .get(identity_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Clone, Default)]
struct RegistryState {
    access_tokens: Option<Arc<dyn TokenProvider>>,
    refresh_tokens: Option<Arc<dyn TokenProvider>>,
    secrets: Option<Arc<dyn SecretResolver>>,
    identities: HashMap<String, Arc<dyn IdentityProvider>>,
    permissions: HashMap<String, Arc<dyn PermissionsProvider>>,
}

/// Mutable, reusable builder for [`Registry`] snapshots.
#[derive(Clone, Default)]
pub struct RegistryBuilder {
    state: RegistryState,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_access_token_provider(&mut self, provider: Arc<dyn TokenProvider>) -> &mut Self {
        self.state.access_tokens = Some(provider);
        self
    }

    pub fn set_refresh_token_provider(&mut self, provider: Arc<dyn TokenProvider>) -> &mut Self {
        self.state.refresh_tokens = Some(provider);
        self
    }

    pub fn set_secret_resolver(&mut self, resolver: Arc<dyn SecretResolver>) -> &mut Self {
        self.state.secrets = Some(resolver);
        self
    }

    /// Registers `provider` under `name`, replacing any earlier entry.
    pub fn add_identity_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn IdentityProvider>,
    ) -> &mut Self {
        self.state.identities.insert(name.into(), provider);
        self
    }

    /// Registers `provider` under `name`, replacing any earlier entry.
    pub fn add_permissions_provider(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn PermissionsProvider>,
    ) -> &mut Self {
        self.state.permissions.insert(name.into(), provider);
        self
    }

    /// Snapshot of the current builder state.
    pub fn build(&self) -> Registry {
        Registry {
            state: Arc::new(self.state.clone()),
        }
    }
}

/// Immutable provider snapshot, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Registry {
    state: Arc<RegistryState>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn access_tokens(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.state.access_tokens.as_ref()
    }

    pub fn refresh_tokens(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.state.refresh_tokens.as_ref()
    }

    pub fn secret_resolver(&self) -> Option<&Arc<dyn SecretResolver>> {
        self.state.secrets.as_ref()
    }

    pub fn identity_provider(&self, name: &str) -> Option<&Arc<dyn IdentityProvider>> {
        self.state.identities.get(name)
    }

    pub fn permissions_provider(&self, name: &str) -> Option<&Arc<dyn PermissionsProvider>> {
        self.state.permissions.get(name)
    }

    /// Registered identity provider names, sorted.
    pub fn identity_provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.state.identities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered permissions provider names, sorted.
    pub fn permissions_provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.state.permissions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Access token provider, or [`AuthzError::Configuration`] when unset.
    pub fn require_access_tokens(&self) -> AuthzResult<&Arc<dyn TokenProvider>> {
        self.access_tokens()
            .ok_or_else(|| AuthzError::Configuration("no access token provider".to_string()))
    }

    /// Refresh token provider, or [`AuthzError::Configuration`] when unset.
    pub fn require_refresh_tokens(&self) -> AuthzResult<&Arc<dyn TokenProvider>> {
        self.refresh_tokens()
            .ok_or_else(|| AuthzError::Configuration("no refresh token provider".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{SecretMaterial, StaticSecretResolver};
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    fn resolver() -> Arc<dyn SecretResolver> {
        Arc::new(StaticSecretResolver::new(SecretMaterial::hmac(
            Algorithm::HS256,
            b"dev-secret".to_vec(),
        )))
    }

    fn alice() -> Identity {
        Identity {
            identity_id: "alice".to_string(),
            display_name: "Alice".to_string(),
        }
    }

    #[test]
    fn empty_builder_produces_empty_registry() {
        let registry = RegistryBuilder::new().build();
        assert!(registry.access_tokens().is_none());
        assert!(registry.refresh_tokens().is_none());
        assert!(registry.secret_resolver().is_none());
        assert!(registry.identity_provider("local").is_none());
        assert!(registry.identity_provider_names().is_empty());
        assert!(matches!(
            registry.require_access_tokens(),
            Err(AuthzError::Configuration(_))
        ));
    }

    #[test]
    fn snapshots_are_independent_of_later_mutation() {
        let mut builder = Registry::builder();
        builder
            .set_secret_resolver(resolver())
            .add_identity_provider("local", Arc::new(InMemoryIdentityProvider::default()));
        let first = builder.build();

        builder
            .add_identity_provider("ldap", Arc::new(InMemoryIdentityProvider::default()))
            .add_permissions_provider("local", Arc::new(InMemoryPermissionsProvider::default()));
        let second = builder.build();

        assert_eq!(first.identity_provider_names(), vec!["local"]);
        assert!(first.permissions_provider("local").is_none());
        assert_eq!(second.identity_provider_names(), vec!["ldap", "local"]);
        assert_eq!(second.permissions_provider_names(), vec!["local"]);
        assert!(second.secret_resolver().is_some());
    }

    #[test]
    fn adding_a_name_twice_replaces_the_provider() {
        let mut builder = RegistryBuilder::new();
        builder
            .add_identity_provider("local", Arc::new(InMemoryIdentityProvider::default()))
            .add_identity_provider("local", Arc::new(InMemoryIdentityProvider::new([alice()])));
        let registry = builder.build();
        assert_eq!(registry.identity_provider_names(), vec!["local"]);
    }

    #[tokio::test]
    async fn in_memory_providers_answer_lookups() {
        let mut permissions = Permissions::new();
        permissions.insert("role".to_string(), json!("admin"));
        let mut builder = RegistryBuilder::new();
        builder
            .add_identity_provider("local", Arc::new(InMemoryIdentityProvider::new([alice()])))
            .add_permissions_provider(
                "local",
                Arc::new(InMemoryPermissionsProvider::new([(
                    "alice".to_string(),
                    permissions.clone(),
                )])),
            );
        let registry = builder.build();

        let identities = registry.identity_provider("local").expect("identities");
        assert_eq!(identities.identity("alice").await.expect("lookup"), Some(alice()));
        assert_eq!(identities.identity("bob").await.expect("lookup"), None);
        assert_eq!(
            identities.verify("alice", "anything").await.expect("verify"),
            None
        );

        let perms = registry.permissions_provider("local").expect("permissions");
        assert_eq!(perms.permissions("alice").await.expect("lookup"), permissions);
        assert!(perms.permissions("bob").await.expect("lookup").is_empty());
    }

    #[tokio::test]
    async fn codec_token_provider_issues_verifiable_tokens() {
        let codec = TokenCodec::new(resolver(), Algorithm::HS256);
        let provider = CodecTokenProvider::new(codec.clone(), "svc-a", Duration::from_secs(300));
        let mut builder = RegistryBuilder::new();
        builder.set_access_token_provider(Arc::new(provider));
        let registry = builder.build();

        let mut permissions = Permissions::new();
        permissions.insert("role".to_string(), json!("admin"));
        let encoded = registry
            .require_access_tokens()
            .expect("provider")
            .issue("alice", permissions)
            .await
            .expect("issue");
        let token = codec.decode(&encoded).await.expect("decode");
        assert_eq!(token.identity_id(), "alice");
        assert_eq!(token.issuer(), "svc-a");
        assert_eq!(token.permission("role"), Some(&json!("admin")));
    }

    #[tokio::test]
    async fn verify_requires_matching_credential() {
        let provider = InMemoryIdentityProvider::new([alice()])
            .with_credential_digest("alice", &credential_digest("correct horse"))
            .expect("digest");

        assert_eq!(
            provider.verify("alice", "correct horse").await.expect("verify"),
            Some(alice())
        );
        assert_eq!(provider.verify("alice", "wrong").await.expect("verify"), None);
        assert_eq!(provider.verify("alice", "").await.expect("verify"), None);
        assert_eq!(
            provider.verify("bob", "correct horse").await.expect("verify"),
            None
        );
    }

    #[test]
    fn credential_digest_must_be_valid_and_for_a_known_identity() {
        let bad_hex =
            InMemoryIdentityProvider::new([alice()]).with_credential_digest("alice", "zz");
        assert!(matches!(bad_hex, Err(AuthzError::Configuration(_))));

        let short =
            InMemoryIdentityProvider::new([alice()]).with_credential_digest("alice", "abcd");
        assert!(matches!(short, Err(AuthzError::Configuration(_))));

        let unknown = InMemoryIdentityProvider::new([alice()])
            .with_credential_digest("bob", &credential_digest("pw"));
        assert!(matches!(unknown, Err(AuthzError::Configuration(_))));
    }

    #[tokio::test]
    async fn refresh_provider_marks_tokens_as_refresh() {
        let codec = TokenCodec::new(resolver(), Algorithm::HS256);
        let provider = CodecTokenProvider::new(codec.clone(), "svc-a", Duration::from_secs(600))
            .with_kind(TokenKind::Refresh);
        let encoded = provider.issue("alice", Permissions::new()).await.expect("issue");
        let token = codec.decode(&encoded).await.expect("decode");
        assert_eq!(token.kind(), TokenKind::Refresh);
    }
}
