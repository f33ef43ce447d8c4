// ABOUTME: Route module organization for the broker HTTP API
// ABOUTME: Resolves the trusted caller identity and assembles the per-domain routers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

//! Route module for the agent broker
//!
//! Each domain module contains only route definitions and thin handler functions that
//! delegate to [`crate::broker::BrokerService`]. Caller identity comes exclusively from the
//! configured trusted header, which the fronting proxy is responsible for setting.

/// Access request routes
pub mod access_requests;

/// Agent registry and invocation routes
pub mod agents;

/// Audit log routes
pub mod audit;

/// Credential routes
pub mod credentials;

/// Health check routes
pub mod health;

/// Provider grant routes
pub mod provider_grants;

pub use access_requests::AccessRequestRoutes;
pub use agents::AgentRoutes;
pub use audit::AuditRoutes;
pub use credentials::CredentialRoutes;
pub use health::HealthRoutes;
pub use provider_grants::ProviderGrantRoutes;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::Router;

use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// Read the trusted caller id. A missing, non-UTF-8 or blank header is unauthenticated.
pub(crate) fn authenticate_caller(
    headers: &HeaderMap,
    resources: &ServerResources,
) -> AppResult<String> {
    headers
        .get(&resources.caller_header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|caller| !caller.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AppError::auth_required("Missing caller identity"))
}

/// Merge every domain router
pub fn api_router(resources: &Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes())
        .merge(CredentialRoutes::routes(resources.clone()))
        .merge(AgentRoutes::routes(resources.clone()))
        .merge(ProviderGrantRoutes::routes(resources.clone()))
        .merge(AccessRequestRoutes::routes(resources.clone()))
        .merge(AuditRoutes::routes(resources.clone()))
}

