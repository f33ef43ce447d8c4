// ABOUTME: Route handlers for the OAuth connect handshake and provider grant lifecycle
// ABOUTME: The finish call carries the state and code the provider redirected back with
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
use broker_core::models::StartConnectInput;
use serde::Deserialize;

use super::authenticate_caller;
use crate::broker::{FinishConnectInput, ListProviderGrantsInput};
use crate::errors::AppError;
use crate::pagination::PageRequest;
use crate::resources::ServerResources;

/// Query parameters for listing grants
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListProviderGrantsQuery {
    /// Provider filter
    pub provider: Option<String>,
    /// Status filter
    pub status: Option<String>,
    /// Page size
    pub page_size: Option<u32>,
    /// Last id of the previous page
    pub page_token: Option<String>,
}

/// Provider grant routes
pub struct ProviderGrantRoutes;

impl ProviderGrantRoutes {
    /// Create all provider grant routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/provider-grants/connect", post(Self::handle_start_connect))
            .route(
                "/v1/provider-grants/connect/:session_id/finish",
                post(Self::handle_finish_connect),
            )
            .route("/v1/provider-grants", get(Self::handle_list))
            .route("/v1/provider-grants/:id/refresh", post(Self::handle_refresh))
            .route("/v1/provider-grants/:id/revoke", post(Self::handle_revoke))
            .with_state(resources)
    }

    #[tracing::instrument(skip_all, fields(route = "start_provider_connect"))]
    async fn handle_start_connect(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(input): Json<StartConnectInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let started = resources
            .broker
            .start_provider_connect(&caller, input)
            .await?;
        Ok((StatusCode::CREATED, Json(started)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "finish_provider_connect"))]
    async fn handle_finish_connect(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(session_id): Path<String>,
        Json(input): Json<FinishConnectInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let grant = resources
            .broker
            .finish_provider_connect(&caller, &session_id, input)
            .await?;
        Ok((StatusCode::CREATED, Json(grant)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "list_provider_grants"))]
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<ListProviderGrantsQuery>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let page = PageRequest {
            page_size: query.page_size,
            page_token: query.page_token,
        };
        let filters = ListProviderGrantsInput {
            provider: query.provider,
            status: query.status,
        };
        let grants = resources
            .broker
            .list_provider_grants(&caller, filters, &page)
            .await?;
        Ok((StatusCode::OK, Json(grants)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "refresh_provider_grant"))]
    async fn handle_refresh(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(grant_id): Path<String>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let grant = resources
            .broker
            .refresh_provider_grant(&caller, &grant_id)
            .await?;
        Ok((StatusCode::OK, Json(grant)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "revoke_provider_grant"))]
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(grant_id): Path<String>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let grant = resources
            .broker
            .revoke_provider_grant(&caller, &grant_id)
            .await?;
        Ok((StatusCode::OK, Json(grant)).into_response())
    }
}
