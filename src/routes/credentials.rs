// ABOUTME: Route handlers for static provider credentials
// ABOUTME: Responses carry summaries only; secrets never leave the broker
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
use broker_core::models::CreateCredentialInput;

use super::authenticate_caller;
use crate::errors::AppError;
use crate::pagination::PageRequest;
use crate::resources::ServerResources;

/// Credential routes
pub struct CredentialRoutes;

impl CredentialRoutes {
    /// Create all credential routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/credentials", post(Self::handle_create))
            .route("/v1/credentials", get(Self::handle_list))
            .route("/v1/credentials/:id/revoke", post(Self::handle_revoke))
            .with_state(resources)
    }

    #[tracing::instrument(skip_all, fields(route = "create_credential"))]
    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(input): Json<CreateCredentialInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let credential = resources.broker.create_credential(&caller, input).await?;
        Ok((StatusCode::CREATED, Json(credential)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "list_credentials"))]
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(page): Query<PageRequest>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let credentials = resources.broker.list_credentials(&caller, &page).await?;
        Ok((StatusCode::OK, Json(credentials)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "revoke_credential"))]
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(credential_id): Path<String>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let credential = resources
            .broker
            .revoke_credential(&caller, &credential_id)
            .await?;
        Ok((StatusCode::OK, Json(credential)).into_response())
    }
}
