//! HTTP API request/response types.
//!
//! # Purpose
//! Defines shared payload shapes for the resource server's REST API.
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginRequest {
    pub identity_id: String,
    #[serde(default)]
    pub credential: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InfoResponse {
    pub authenticated: bool,
    pub identity_id: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProtectedResponse {
    pub identity_id: String,
    pub message: String,
}
