//! Secret resolution for token signing and verification.
//!
//! # Purpose
//! Maps a rotation key (a token's expiration, in seconds since the Unix epoch)
//! to the secret material that was valid for that point in time.
//!
//! # Key invariants
//! - A fixed rotation key always resolves to the same secret for the lifetime
//!   of its rotation window.
//! - Rotation windows never overlap, so a token signed under one window can
//!   never be checked against another window's secret.
//! - A missing secret is an error, never a silent default.
//!
//! # Security model
//! The rotation key handed to [`SecretResolver::resolve`] during decoding is
//! read from an unverified token. Resolution only selects *which* secret to
//! verify with; the signature check still has to pass against that secret.
use crate::{AuthzError, AuthzResult};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Largest clock-skew tolerance, in seconds, that a codec accepts on expiry.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// Raw key bytes for a secret.
#[derive(Clone)]
pub enum SecretKey {
    /// Shared HMAC secret.
    Hmac(Vec<u8>),
    /// Asymmetric key pair in PEM form. `private_pem` is absent on
    /// verification-only deployments.
    Pem {
        private_pem: Option<Vec<u8>>,
        public_pem: Vec<u8>,
    },
}

/// Secret bytes plus the algorithm they are used with.
#[derive(Clone)]
pub struct SecretMaterial {
    pub alg: Algorithm,
    pub key: SecretKey,
}

impl SecretMaterial {
    pub fn hmac(alg: Algorithm, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            alg,
            key: SecretKey::Hmac(secret.into()),
        }
    }

    pub fn pem(alg: Algorithm, private_pem: Option<Vec<u8>>, public_pem: Vec<u8>) -> Self {
        Self {
            alg,
            key: SecretKey::Pem {
                private_pem,
                public_pem,
            },
        }
    }

    pub fn encoding_key(&self) -> AuthzResult<EncodingKey> {
        match &self.key {
            SecretKey::Hmac(secret) => {
                ensure_family(self.alg, KeyFamily::Hmac)?;
                Ok(EncodingKey::from_secret(secret))
            }
            SecretKey::Pem { private_pem, .. } => {
                let pem = private_pem.as_deref().ok_or_else(|| {
                    AuthzError::SigningFailed("secret has no private key".to_string())
                })?;
                let key = match key_family(self.alg) {
                    KeyFamily::Rsa => EncodingKey::from_rsa_pem(pem),
                    KeyFamily::Ec => EncodingKey::from_ec_pem(pem),
                    KeyFamily::Ed => EncodingKey::from_ed_pem(pem),
                    KeyFamily::Hmac => {
                        return Err(AuthzError::SigningFailed(format!(
                            "{:?} requires an hmac secret",
                            self.alg
                        )));
                    }
                };
                key.map_err(|err| AuthzError::SigningFailed(err.to_string()))
            }
        }
    }

    /// Verification key. Parse failures are reported as
    /// [`AuthzError::SecretUnavailable`] so the caller can fold them into an
    /// authentication failure.
    pub fn decoding_key(&self) -> AuthzResult<DecodingKey> {
        match &self.key {
            SecretKey::Hmac(secret) => {
                ensure_family(self.alg, KeyFamily::Hmac)?;
                Ok(DecodingKey::from_secret(secret))
            }
            SecretKey::Pem { public_pem, .. } => {
                let key = match key_family(self.alg) {
                    KeyFamily::Rsa => DecodingKey::from_rsa_pem(public_pem),
                    KeyFamily::Ec => DecodingKey::from_ec_pem(public_pem),
                    KeyFamily::Ed => DecodingKey::from_ed_pem(public_pem),
                    KeyFamily::Hmac => {
                        return Err(AuthzError::SecretUnavailable(format!(
                            "{:?} requires an hmac secret",
                            self.alg
                        )));
                    }
                };
                key.map_err(|err| AuthzError::SecretUnavailable(err.to_string()))
            }
        }
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.key {
            SecretKey::Hmac(_) => "hmac",
            SecretKey::Pem { .. } => "pem",
        };
        f.debug_struct("SecretMaterial")
            .field("alg", &self.alg)
            .field("key", &kind)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

fn key_family(alg: Algorithm) -> KeyFamily {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
        Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
        Algorithm::EdDSA => KeyFamily::Ed,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => KeyFamily::Rsa,
    }
}

fn ensure_family(alg: Algorithm, expected: KeyFamily) -> AuthzResult<()> {
    if key_family(alg) != expected {
        return Err(AuthzError::SecretUnavailable(format!(
            "{alg:?} cannot be used with a {expected:?} secret"
        )));
    }
    Ok(())
}

/// Source of secret material keyed by rotation window.
///
/// Implementations may perform I/O (for example a remote key-management
/// call) and are responsible for bounding their own latency. A resolver must
/// be idempotent for a fixed `rotation_key`.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, rotation_key: i64) -> AuthzResult<SecretMaterial>;
}

/// Returns the same secret for every rotation key. Development only; there is
/// no real rotation.
#[derive(Debug, Clone)]
pub struct StaticSecretResolver {
    secret: SecretMaterial,
}

impl StaticSecretResolver {
    pub fn new(secret: SecretMaterial) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(&self, _rotation_key: i64) -> AuthzResult<SecretMaterial> {
        Ok(self.secret.clone())
    }
}

/// A half-open `[not_before, not_after)` range of rotation keys sharing one
/// secret.
#[derive(Debug, Clone)]
pub struct RotationWindow {
    pub not_before: i64,
    pub not_after: i64,
    pub secret: SecretMaterial,
}

impl RotationWindow {
    pub fn new(not_before: i64, not_after: i64, secret: SecretMaterial) -> Self {
        Self {
            not_before,
            not_after,
            secret,
        }
    }

    pub fn contains(&self, rotation_key: i64) -> bool {
        rotation_key >= self.not_before && rotation_key < self.not_after
    }
}

/// Selects a secret from a fixed set of non-overlapping rotation windows.
#[derive(Debug, Clone)]
pub struct RotatingSecretResolver {
    windows: Vec<RotationWindow>,
}

impl RotatingSecretResolver {
    /// Fails with [`AuthzError::Configuration`] when a window is empty or two
    /// windows overlap.
    pub fn new(mut windows: Vec<RotationWindow>) -> AuthzResult<Self> {
        windows.sort_by_key(|window| window.not_before);
        for window in &windows {
            if window.not_after <= window.not_before {
                return Err(AuthzError::Configuration(format!(
                    "empty rotation window [{}, {})",
                    window.not_before, window.not_after
                )));
            }
        }
        for pair in windows.windows(2) {
            if pair[1].not_before < pair[0].not_after {
                return Err(AuthzError::Configuration(format!(
                    "rotation windows [{}, {}) and [{}, {}) overlap",
                    pair[0].not_before, pair[0].not_after, pair[1].not_before, pair[1].not_after
                )));
            }
        }
        Ok(Self { windows })
    }

    pub fn windows(&self) -> &[RotationWindow] {
        &self.windows
    }
}

#[async_trait]
impl SecretResolver for RotatingSecretResolver {
    async fn resolve(&self, rotation_key: i64) -> AuthzResult<SecretMaterial> {
        self.windows
            .iter()
            .find(|window| window.contains(rotation_key))
            .map(|window| window.secret.clone())
            .ok_or_else(|| {
                AuthzError::SecretUnavailable(format!("no rotation window for {rotation_key}"))
            })
    }
}

/// Bounds every call to an inner resolver.
pub struct TimeoutSecretResolver {
    inner: Arc<dyn SecretResolver>,
    timeout: Duration,
}

impl TimeoutSecretResolver {
    pub fn new(inner: Arc<dyn SecretResolver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl SecretResolver for TimeoutSecretResolver {
    async fn resolve(&self, rotation_key: i64) -> AuthzResult<SecretMaterial> {
        tokio::time::timeout(self.timeout, self.inner.resolve(rotation_key))
            .await
            .map_err(|_| {
                AuthzError::SecretUnavailable(format!(
                    "resolver timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }
}
