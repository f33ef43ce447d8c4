// ABOUTME: Route handlers for the agent registry and agent invocation
// ABOUTME: Shared viewers get the shared projection; invocation runs through the authorizer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

//! Agent routes
//!
//! `/v1/agents` lists only agents the caller owns; `/v1/agents/accessible` adds agents shared
//! with the caller through approved access requests.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use broker_core::models::{CreateAgentInput, UpdateAgentInput};

use super::authenticate_caller;
use crate::broker::InvokeAgentInput;
use crate::errors::AppError;
use crate::pagination::PageRequest;
use crate::resources::ServerResources;

/// Agent routes
pub struct AgentRoutes;

impl AgentRoutes {
    /// Create all agent routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/v1/agents", post(Self::handle_create))
            .route("/v1/agents", get(Self::handle_list))
            .route("/v1/agents/accessible", get(Self::handle_list_accessible))
            .route("/v1/agents/accessible/:id", get(Self::handle_get_accessible))
            .route(
                "/v1/agents/:id",
                patch(Self::handle_update).delete(Self::handle_delete),
            )
            .route("/v1/agents/:id/invoke", post(Self::handle_invoke))
            .with_state(resources)
    }

    #[tracing::instrument(skip_all, fields(route = "create_agent"))]
    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(input): Json<CreateAgentInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let agent = resources.broker.create_agent(&caller, input).await?;
        Ok((StatusCode::CREATED, Json(agent)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "list_agents"))]
    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(page): Query<PageRequest>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let agents = resources.broker.list_agents(&caller, &page).await?;
        Ok((StatusCode::OK, Json(agents)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "list_accessible_agents"))]
    async fn handle_list_accessible(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(page): Query<PageRequest>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let agents = resources
            .broker
            .list_accessible_agents(&caller, &page)
            .await?;
        Ok((StatusCode::OK, Json(agents)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "get_accessible_agent"))]
    async fn handle_get_accessible(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<String>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let agent = resources
            .broker
            .get_accessible_agent(&caller, &agent_id)
            .await?;
        Ok((StatusCode::OK, Json(agent)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "update_agent"))]
    async fn handle_update(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<String>,
        Json(input): Json<UpdateAgentInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let agent = resources
            .broker
            .update_agent(&caller, &agent_id, input)
            .await?;
        Ok((StatusCode::OK, Json(agent)).into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "delete_agent"))]
    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<String>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        resources.broker.delete_agent(&caller, &agent_id).await?;
        Ok(StatusCode::NO_CONTENT.into_response())
    }

    #[tracing::instrument(skip_all, fields(route = "invoke_agent"))]
    async fn handle_invoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(agent_id): Path<String>,
        Json(input): Json<InvokeAgentInput>,
    ) -> Result<Response, AppError> {
        let caller = authenticate_caller(&headers, &resources)?;
        let output = resources
            .broker
            .invoke_agent(&caller, &agent_id, input)
            .await?;
        Ok((StatusCode::OK, Json(output)).into_response())
    }
}
