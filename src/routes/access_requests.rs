// ABOUTME: Route handlers for the access request workflow
// ABOUTME: Requesters create and list; owners review and revoke
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use broker_core::models::{AccessRequestRole, CreateAccessRequestInput};
use serde::Deserialize;

use super::authenticate_caller;
use crate::broker::ReviewAccessRequestInput;
use crate::errors::AppError;
use crate::pagination::PageRequest;
use crate::resources::ServerResources;

/// Query parameters for listing access requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAccessRequestsQuery {
    /// `requester` (default) or `owner`
    pub role: Option<String>,
    /// Page size
    pub page_size: Option<u32>,
    /// Last id of the previous page
    pub page_token: Option<String>,
}

/// Optional body for revoking an approval
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevokeAccessRequestBody {
    /// Note recorded on the request
    #[serde(default)]
    pub note: Option<String>,
}

/// Access request routes
pub struct AccessRequestRoutes;

impl AccessRequestRoutes {
    /// Create all access request routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/access-requests", post(Self::handle_create))
            .route("/v1/access-requests", get(Self::handle_list))
            .route("/v1/access-requests/:id/review", post(Self::handle_review))
            .route("/v1/access-requests/:id/revoke", post(Self::handle_revoke))
            .with_state(resources)
    }

    #[tracing::instrument(skip_all, fields(route = "create_access_request"))]
    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(input): Json<CreateAccessRequestInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let request = resources
            .broker
            .create_access_request(&caller, input)
            .await?;
        Ok((StatusCode::CREATED, Json(request)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "list_access_requests"))]
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<ListAccessRequestsQuery>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let role: AccessRequestRole = query.role.as_deref().unwrap_or_default().parse()?;
        let page = PageRequest {
            page_size: query.page_size,
            page_token: query.page_token,
        };
        let requests = resources
            .broker
            .list_access_requests(&caller, role, &page)
            .await?;
        Ok((StatusCode::OK, Json(requests)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "review_access_request"))]
    async fn handle_review(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(request_id): Path<String>,
        Json(input): Json<ReviewAccessRequestInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let request = resources
            .broker
            .review_access_request(&caller, &request_id, input)
            .await?;
        Ok((StatusCode::OK, Json(request)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "revoke_access_request"))]
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(request_id): Path<String>,
        body: Option<Json<RevokeAccessRequestBody>>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let note = body.and_then(|Json(body)| body.note);
        let request = resources
            .broker
            .revoke_access_request(&caller, &request_id, note.as_deref())
            .await?;
        Ok((StatusCode::OK, Json(request)).into_response())
    }
}
