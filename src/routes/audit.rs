// ABOUTME: Route handler for listing audit events
// ABOUTME: Always scoped to events owned by the caller; filters only narrow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::authenticate_caller;
use crate::broker::ListAuditEventsInput;
use crate::errors::AppError;
use crate::pagination::PageRequest;
use crate::resources::ServerResources;

/// Query parameters for listing audit events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAuditEventsQuery {
    /// Event name filter
    pub event_name: Option<String>,
    /// Agent filter
    pub agent_id: Option<String>,
    /// RFC 3339 lower bound
    pub created_after: Option<String>,
    /// RFC 3339 upper bound
    pub created_before: Option<String>,
    /// Page size
    pub page_size: Option<u32>,
    /// Last id of the previous page
    pub page_token: Option<String>,
}

/// Audit routes
pub struct AuditRoutes;

impl AuditRoutes {
    /// Create the audit router
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/audit-events", get(Self::handle_list))
            .with_state(resources)
    }

    #[tracing::instrument(skip_all, fields(route = "list_audit_events"))]
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<ListAuditEventsQuery>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let page = PageRequest {
            page_size: query.page_size,
            page_token: query.page_token,
        };
        let filters = ListAuditEventsInput {
            event_name: query.event_name,
            agent_id: query.agent_id,
            created_after: query.created_after,
            created_before: query.created_before,
        };
        let events = resources
            .broker
            .list_audit_events(&caller, filters, &page)
            .await?;
        Ok((StatusCode::OK, Json(events)).into_response())
    }
}
