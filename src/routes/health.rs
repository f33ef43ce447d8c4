// ABOUTME: Liveness endpoint for load balancers and orchestrators
// ABOUTME: Unauthenticated; reports service name and version only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "agent-broker";

/// Liveness payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` when the process answers
    pub status: String,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
}

/// Health routes
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the health router
    pub fn routes() -> Router {
        Router::new().route("/health", get(Self::handle_health))
    }

    async fn handle_health() -> impl IntoResponse {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_owned(),
                service: SERVICE_NAME.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            }),
        )
    }
}
