//! Signed identity tokens: creation, signing, and verification.
//!
//! # Purpose
//! Turns identity + permission claims into compact signed tokens
//! (`header.payload.signature`) and back, picking the signing/verification
//! secret through a [`SecretResolver`] keyed by the token's expiration.
//!
//! # Key invariants
//! - Expiration is always set at creation (`now + ttl`); claims are never
//!   mutated afterwards.
//! - The verification algorithm is fixed per codec; the algorithm advertised
//!   in a token header is never trusted.
//! - Every decode failure is reported as [`AuthzError::InvalidToken`]. The
//!   concrete reason is logged at `debug` level and never returned.
//!
//! # Security model
//! Decoding reads `exp` from the still-unverified payload to choose a rotation
//! window. That is only a lookup key: the signature must still verify against
//! the chosen window's secret, and rotation windows never overlap.
use crate::secret::{MAX_CLOCK_SKEW_SECS, SecretResolver};
use crate::{AuthzError, AuthzResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Open mapping of permission name to permission value.
pub type Permissions = serde_json::Map<String, Value>;

/// Claim names owned by the token itself; never accepted as permissions.
pub const RESERVED_CLAIMS: [&str; 4] = ["iss", "exp", "userId", "typ"];

/// Carried in the `typ` claim. Only access tokens pass an [`Authorizer`];
/// refresh tokens exist to be exchanged for new access tokens.
///
/// [`Authorizer`]: crate::Authorizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

/// The claim set carried by a signed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    iss: String,
    exp: i64,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(default)]
    typ: TokenKind,
    #[serde(flatten)]
    permissions: Permissions,
}

impl Token {
    /// Build a claim set with an explicit expiration (seconds since epoch).
    ///
    /// Reserved claim names are dropped from `permissions` so they cannot
    /// shadow the public claims once flattened.
    pub fn expiring_at(
        identity_id: impl Into<String>,
        exp: i64,
        issuer: impl Into<String>,
        mut permissions: Permissions,
    ) -> Self {
        for reserved in RESERVED_CLAIMS {
            permissions.remove(reserved);
        }
        Self {
            iss: issuer.into(),
            exp,
            user_id: identity_id.into(),
            typ: TokenKind::Access,
            permissions,
        }
    }

    /// Mark the claim set as another kind of token before it is signed.
    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.typ = kind;
        self
    }

    pub fn kind(&self) -> TokenKind {
        self.typ
    }

    pub fn issuer(&self) -> &str {
        &self.iss
    }

    pub fn expiration(&self) -> i64 {
        self.exp
    }

    pub fn identity_id(&self) -> &str {
        &self.user_id
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    pub fn permission(&self, name: &str) -> Option<&Value> {
        self.permissions.get(name)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

#[derive(Deserialize)]
struct UnverifiedExpiry {
    exp: i64,
}

/// Creates, signs, and verifies [`Token`]s.
#[derive(Clone)]
pub struct TokenCodec {
    resolver: Arc<dyn SecretResolver>,
    algorithm: Algorithm,
    leeway: u64,
}

impl TokenCodec {
    pub fn new(resolver: Arc<dyn SecretResolver>, algorithm: Algorithm) -> Self {
        Self {
            resolver,
            algorithm,
            leeway: 0,
        }
    }

    /// Clock-skew tolerance applied to `exp`, clamped to
    /// [`MAX_CLOCK_SKEW_SECS`].
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway = leeway_secs.min(MAX_CLOCK_SKEW_SECS);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn leeway(&self) -> u64 {
        self.leeway
    }

    /// Build an unsigned claim set expiring `ttl` from now.
    pub fn create(
        &self,
        identity_id: impl Into<String>,
        ttl: Duration,
        issuer: impl Into<String>,
        permissions: Permissions,
    ) -> Token {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let exp = now_epoch_seconds().saturating_add(ttl_secs);
        Token::expiring_at(identity_id, exp, issuer, permissions)
    }

    /// Sign a claim set with the secret for its expiration window.
    pub async fn encode(&self, token: &Token) -> AuthzResult<String> {
        let secret = self
            .resolver
            .resolve(token.exp)
            .await
            .map_err(|err| AuthzError::SigningFailed(err.to_string()))?;
        if secret.alg != self.algorithm {
            return Err(AuthzError::SigningFailed(format!(
                "resolved secret is {:?}, codec requires {:?}",
                secret.alg, self.algorithm
            )));
        }
        let encoding_key = secret
            .encoding_key()
            .map_err(|err| AuthzError::SigningFailed(err.to_string()))?;
        jsonwebtoken::encode(&Header::new(self.algorithm), token, &encoding_key)
            .map_err(|err| AuthzError::SigningFailed(err.to_string()))
    }

    /// Verify a signed token and return its claims.
    pub async fn decode(&self, encoded: &str) -> AuthzResult<Token> {
        match self.verify(encoded).await {
            Ok(token) => Ok(token),
            Err(err) => {
                tracing::debug!(error = %err, "token verification failed");
                Err(AuthzError::InvalidToken)
            }
        }
    }

    async fn verify(&self, encoded: &str) -> AuthzResult<Token> {
        // Untrusted: only used to pick a rotation window.
        let claimed_exp = claimed_expiration(encoded)?;
        let secret = self.resolver.resolve(claimed_exp).await?;
        if secret.alg != self.algorithm {
            return Err(AuthzError::SecretUnavailable(format!(
                "resolved secret is {:?}, codec requires {:?}",
                secret.alg, self.algorithm
            )));
        }
        let decoding_key = secret.decoding_key()?;

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iss"]);
        let data = jsonwebtoken::decode::<Token>(encoded, &decoding_key, &validation)?;
        Ok(data.claims)
    }
}

/// Read `exp` from a token payload without checking the signature.
fn claimed_expiration(encoded: &str) -> AuthzResult<i64> {
    let mut segments = encoded.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthzError::InvalidToken);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthzError::InvalidToken)?;
    let claims: UnverifiedExpiry =
        serde_json::from_slice(&bytes).map_err(|_| AuthzError::InvalidToken)?;
    Ok(claims.exp)
}

pub(crate) fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
