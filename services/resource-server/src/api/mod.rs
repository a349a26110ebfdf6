//! Resource-server HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules and the shared request/response and error
//! types.
pub mod error;
pub mod resources;
pub mod session;
pub mod system;
pub mod types;
