//! Resource-server service library crate.
//!
//! # Purpose
//! Exposes the HTTP API, authorization wiring, configuration, and
//! observability helpers for use by the binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod observability;
