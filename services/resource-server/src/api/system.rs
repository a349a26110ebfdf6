//! System/health API handlers.
//!
//! # Purpose and responsibility
//! Provides a lightweight liveness endpoint for probes.
//!
//! # Key invariants and assumptions
//! - Health checks must be fast and side-effect free.
//! - The route is mounted outside every authorizer.
use crate::api::types::HealthStatus;
use axum::Json;

/// Return resource-server health status.
pub(crate) async fn system_health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}
