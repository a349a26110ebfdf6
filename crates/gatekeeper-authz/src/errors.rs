use thiserror::Error;

/// Failure kinds produced by the token codec, secret resolution, and
/// endpoint authorization.
///
/// `Display` output carries internal detail and is meant for logs only. Use
/// [`AuthzError::public_message`] for anything sent back to a caller.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("missing credentials")]
    MissingCredentials,
    /// Malformed, expired, or badly signed. Deliberately a single variant.
    #[error("invalid token")]
    InvalidToken,
    #[error("issuer not trusted: {0}")]
    IssuerNotTrusted(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("secret unavailable: {0}")]
    SecretUnavailable(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

pub type AuthzResult<T> = Result<T, AuthzError>;

impl AuthzError {
    /// HTTP status the request boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthzError::MissingCredentials
            | AuthzError::InvalidToken
            | AuthzError::SecretUnavailable(_)
            | AuthzError::Jwt(_) => 401,
            AuthzError::IssuerNotTrusted(_) | AuthzError::PermissionDenied(_) => 403,
            AuthzError::SigningFailed(_)
            | AuthzError::ProviderUnavailable(_)
            | AuthzError::Configuration(_) => 500,
        }
    }

    /// Generic message safe to return to an untrusted caller.
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            401 => "Not authenticated",
            403 => "Not authorized",
            _ => "Error encountered",
        }
    }

    /// Stable machine-readable code used in response bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self.status_code() {
            401 => "unauthorized",
            403 => "forbidden",
            _ => "internal",
        }
    }
}
