//! Authorization wiring and request middleware for the resource server.
//!
//! # Purpose
//! Builds the token codec, provider registry, and per-endpoint authorizers
//! from configuration, and adapts them to Axum middleware.
pub mod middleware;
pub mod wiring;
