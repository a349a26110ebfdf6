//! Token-based authorization primitives for HTTP resource servers.
//!
//! # Purpose
//! Issues and verifies signed identity tokens, resolves signing secrets by
//! rotation window, and evaluates per-endpoint issuer and permission rules
//! before a request reaches application logic.
//!
//! # How it fits
//! Services build one [`Registry`] and a set of [`Authorizer`]s at startup,
//! then hand each request's `authentication` header to
//! [`Authorizer::evaluate`]. Nothing here depends on an HTTP framework; the
//! host layer maps a [`Decision`] onto its own request/response types.
//!
//! # Key invariants
//! - The verification algorithm is fixed per [`TokenCodec`]; token headers
//!   cannot negotiate it.
//! - Decode failures are never distinguished to callers (expired, forged, and
//!   malformed tokens are all [`AuthzError::InvalidToken`]).
//! - Authorizers and registry snapshots are immutable once built.
//!
//! # Examples
//! ```rust
//! use gatekeeper_authz::{Authorizer, SecretMaterial, StaticSecretResolver, TokenCodec};
//! use jsonwebtoken::Algorithm;
//! use std::sync::Arc;
//!
//! let resolver = StaticSecretResolver::new(SecretMaterial::hmac(Algorithm::HS256, b"dev".to_vec()));
//! let codec = TokenCodec::new(Arc::new(resolver), Algorithm::HS256);
//! let authorizer = Authorizer::builder(codec)
//!     .allow_issuer("svc-a")
//!     .permission_equals("role", "admin")
//!     .build()
//!     .expect("valid configuration");
//! assert_eq!(authorizer.required_permissions(), vec!["role"]);
//! ```
//!
//! # Common pitfalls
//! - Building a private authorizer with no permission requirements fails; use
//!   `open_to_public` to mark an unrestricted endpoint explicitly.
//! - Rotation windows must not overlap; [`RotatingSecretResolver::new`]
//!   rejects overlapping sets.

mod authorizer;
mod errors;
mod filter;
mod registry;
mod secret;
mod token;

pub use authorizer::{
    AUTHENTICATION_HEADER, Authorizer, BEARER_PREFIX, Decision, EndpointAuthorizerBuilder,
    Rejection, extract_bearer,
};
pub use errors::{AuthzError, AuthzResult};
pub use filter::{
    PermissionFilter, is_absent, permission_equals, permission_exists, permission_matches,
    permission_not_equals, wildcard_match,
};
pub use registry::{
    CodecTokenProvider, Identity, IdentityProvider, InMemoryIdentityProvider,
    InMemoryPermissionsProvider, PermissionsProvider, Registry, RegistryBuilder, TokenProvider,
    credential_digest,
};
pub use secret::{
    MAX_CLOCK_SKEW_SECS, RotatingSecretResolver, RotationWindow, SecretKey, SecretMaterial,
    SecretResolver, StaticSecretResolver, TimeoutSecretResolver,
};
pub use token::{Permissions, RESERVED_CLAIMS, Token, TokenCodec, TokenKind};
