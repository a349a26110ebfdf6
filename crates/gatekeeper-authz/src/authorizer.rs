//! Per-endpoint authorization: bearer extraction, token verification, issuer
//! allow-listing, and permission filters.
//!
//! # Purpose
//! [`EndpointAuthorizerBuilder`] accumulates an endpoint's rules and freezes
//! them into an [`Authorizer`], which evaluates each request independently:
//!
//! 1. extract the bearer token from the `authentication` header;
//! 2. decode and verify it with the [`TokenCodec`];
//! 3. check the issuer against the allow-list, if one is configured;
//! 4. apply every permission's filters in registration order, stopping at the
//!    first failure;
//! 5. yield the verified token.
//!
//! # Key invariants
//! - A built [`Authorizer`] is immutable and safe to share across tasks.
//! - Private endpoints without permission requirements, or with an empty
//!   issuer allow-list, fail at build time.
//! - Public endpoints only waive the requirement to present a token. A token
//!   that verifies is still subject to the issuer and permission checks.
//! - Rejections expose a status code and a generic message; the detailed
//!   reason only reaches the audit log.
use crate::filter::{
    PermissionFilter, is_absent, permission_equals, permission_exists, permission_matches,
};
use crate::registry::PermissionsProvider;
use crate::token::{Permissions, Token, TokenCodec, TokenKind};
use crate::{AuthzError, AuthzResult};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Request header carrying the bearer token.
pub const AUTHENTICATION_HEADER: &str = "authentication";
/// Literal prefix (including the colon) expected before the token.
pub const BEARER_PREFIX: &str = "Bearer: ";

/// Strip [`BEARER_PREFIX`] from a raw header value. A missing header, a
/// different scheme, or an empty token all yield `None`.
pub fn extract_bearer(header_value: Option<&str>) -> Option<&str> {
    let token = header_value?.strip_prefix(BEARER_PREFIX)?;
    (!token.is_empty()).then_some(token)
}

struct PermissionRequirement {
    name: String,
    filters: Vec<PermissionFilter>,
}

struct AuthorizerConfig {
    codec: TokenCodec,
    is_public: bool,
    allowed_issuers: Option<BTreeSet<String>>,
    requirements: Vec<PermissionRequirement>,
    permissions_provider: Option<Arc<dyn PermissionsProvider>>,
}

/// Fluent configuration for an [`Authorizer`]. Endpoints are private unless
/// [`open_to_public`](Self::open_to_public) is called.
pub struct EndpointAuthorizerBuilder {
    config: AuthorizerConfig,
}

impl EndpointAuthorizerBuilder {
    pub fn new(codec: TokenCodec) -> Self {
        Self {
            config: AuthorizerConfig {
                codec,
                is_public: false,
                allowed_issuers: None,
                requirements: Vec::new(),
                permissions_provider: None,
            },
        }
    }

    /// Accept requests without a token.
    pub fn open_to_public(mut self) -> Self {
        self.config.is_public = true;
        self
    }

    /// Trust exactly one issuer. Replaces any earlier allow-list.
    pub fn allow_issuer(self, issuer: impl Into<String>) -> Self {
        self.allow_issuers([issuer])
    }

    /// Trust the given issuers. Replaces any earlier allow-list.
    pub fn allow_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_issuers = Some(issuers.into_iter().map(Into::into).collect());
        self
    }

    /// Require `name` to be present and to satisfy `filter`. Filters for the
    /// same name accumulate and must all pass.
    pub fn filter_permission(mut self, name: impl Into<String>, filter: PermissionFilter) -> Self {
        let name = name.into();
        match self
            .config
            .requirements
            .iter_mut()
            .find(|requirement| requirement.name == name)
        {
            Some(requirement) => requirement.filters.push(filter),
            None => self.config.requirements.push(PermissionRequirement {
                name,
                filters: vec![filter],
            }),
        }
        self
    }

    pub fn has_permission(self, name: impl Into<String>) -> Self {
        self.filter_permission(name, permission_exists())
    }

    pub fn permission_equals(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_permission(name, permission_equals(value))
    }

    /// Require a string permission matching a `*` wildcard pattern.
    pub fn permission_matches(self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter_permission(name, permission_matches(pattern))
    }

    /// Evaluate filters against the provider's current permissions for the
    /// token's identity instead of the claims embedded in the token.
    pub fn permissions_from(mut self, provider: Arc<dyn PermissionsProvider>) -> Self {
        self.config.permissions_provider = Some(provider);
        self
    }

    pub fn build(self) -> AuthzResult<Authorizer> {
        let config = self.config;
        if !config.is_public {
            if config.requirements.is_empty() {
                return Err(AuthzError::Configuration(
                    "private authorizer has no required permissions; call open_to_public to \
                     mark an unrestricted endpoint explicitly"
                        .to_string(),
                ));
            }
            if config
                .allowed_issuers
                .as_ref()
                .is_some_and(|issuers| issuers.is_empty())
            {
                return Err(AuthzError::Configuration(
                    "private authorizer has an empty issuer allow-list".to_string(),
                ));
            }
        }
        Ok(Authorizer {
            config: Arc::new(config),
        })
    }
}

/// Outcome of evaluating one request.
#[derive(Debug)]
pub enum Decision {
    /// `None` for anonymous access to a public endpoint.
    Authorized(Option<Token>),
    Rejected(Rejection),
}

impl Decision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Decision::Authorized(_))
    }

    pub fn into_result(self) -> Result<Option<Token>, Rejection> {
        match self {
            Decision::Authorized(token) => Ok(token),
            Decision::Rejected(rejection) => Err(rejection),
        }
    }
}

/// A refused request. Only [`status`](Self::status) and
/// [`public_message`](Self::public_message) may be sent to the caller.
#[derive(Debug)]
pub struct Rejection {
    error: AuthzError,
    identity_id: Option<String>,
    issuer: Option<String>,
}

impl Rejection {
    fn new(error: AuthzError, token: Option<&Token>) -> Self {
        Self {
            error,
            identity_id: token.map(|token| token.identity_id().to_string()),
            issuer: token.map(|token| token.issuer().to_string()),
        }
    }

    pub fn status(&self) -> u16 {
        self.error.status_code()
    }

    pub fn public_message(&self) -> &'static str {
        self.error.public_message()
    }

    pub fn error(&self) -> &AuthzError {
        &self.error
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.identity_id.as_deref()
    }

    /// Issuer of the rejected token, when it verified.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }
}

/// Frozen endpoint rules; cloning shares the same configuration.
#[derive(Clone)]
pub struct Authorizer {
    config: Arc<AuthorizerConfig>,
}

impl Authorizer {
    pub fn builder(codec: TokenCodec) -> EndpointAuthorizerBuilder {
        EndpointAuthorizerBuilder::new(codec)
    }

    pub fn is_public(&self) -> bool {
        self.config.is_public
    }

    /// Names of the required permissions, in evaluation order.
    pub fn required_permissions(&self) -> Vec<&str> {
        self.config
            .requirements
            .iter()
            .map(|requirement| requirement.name.as_str())
            .collect()
    }

    /// Evaluate a request given the raw value of its `authentication` header.
    pub async fn evaluate(&self, header_value: Option<&str>) -> Decision {
        match self.authorize(header_value).await {
            Ok(token) => Decision::Authorized(token),
            Err(rejection) => {
                let permission = match rejection.error() {
                    AuthzError::PermissionDenied(name) => Some(name.as_str()),
                    _ => None,
                };
                tracing::warn!(
                    identity = %rejection.identity_id().unwrap_or("-"),
                    permission = %permission.unwrap_or("-"),
                    issuer = %rejection.issuer().unwrap_or("-"),
                    status = rejection.status(),
                    error = %rejection.error(),
                    "request rejected"
                );
                Decision::Rejected(rejection)
            }
        }
    }

    async fn authorize(&self, header_value: Option<&str>) -> Result<Option<Token>, Rejection> {
        let config = &self.config;
        let Some(bearer) = extract_bearer(header_value) else {
            if config.is_public {
                return Ok(None);
            }
            return Err(Rejection::new(AuthzError::MissingCredentials, None));
        };

        let token = match config.codec.decode(bearer).await.and_then(require_access) {
            Ok(token) => token,
            Err(_) if config.is_public => {
                tracing::debug!("ignoring invalid token on public endpoint");
                return Ok(None);
            }
            Err(err) => return Err(Rejection::new(err, None)),
        };

        if let Err(err) = self.check_issuer(&token) {
            return Err(Rejection::new(err, Some(&token)));
        }
        if let Err(err) = self.check_permissions(&token).await {
            return Err(Rejection::new(err, Some(&token)));
        }
        Ok(Some(token))
    }

    fn check_issuer(&self, token: &Token) -> AuthzResult<()> {
        match &self.config.allowed_issuers {
            Some(allowed) if !allowed.contains(token.issuer()) => {
                Err(AuthzError::IssuerNotTrusted(token.issuer().to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn check_permissions(&self, token: &Token) -> AuthzResult<()> {
        if self.config.requirements.is_empty() {
            return Ok(());
        }
        let live: Permissions;
        let claims = match &self.config.permissions_provider {
            Some(provider) => {
                live = provider
                    .permissions(token.identity_id())
                    .await
                    .map_err(|err| AuthzError::ProviderUnavailable(err.to_string()))?;
                &live
            }
            None => token.permissions(),
        };

        for requirement in &self.config.requirements {
            let value = claims.get(&requirement.name);
            let satisfied = !is_absent(value)
                && value.is_some_and(|value| {
                    requirement
                        .filters
                        .iter()
                        .all(|filter| filter(&requirement.name, value))
                });
            if !satisfied {
                return Err(AuthzError::PermissionDenied(requirement.name.clone()));
            }
        }
        Ok(())
    }
}

/// Refresh tokens verify like any other token but never authorize a request.
fn require_access(token: Token) -> AuthzResult<Token> {
    match token.kind() {
        TokenKind::Access => Ok(token),
        TokenKind::Refresh => {
            tracing::debug!(identity = token.identity_id(), "refresh token presented for access");
            Err(AuthzError::InvalidToken)
        }
    }
}
