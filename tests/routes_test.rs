// ABOUTME: HTTP-level tests for the broker router
// ABOUTME: Covers caller authentication, status codes, error bodies and an end-to-end share flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use agent_broker::server::BrokerServer;
use axum::http::StatusCode;
use axum::Router;
use common::{TestBroker, CALLER_HEADER};
use helpers::axum_test::AxumTestRequest;
use serde_json::{json, Value};

fn router(test: &TestBroker) -> Router {
    BrokerServer::new(test.resources()).router()
}

#[tokio::test]
async fn test_health_needs_no_caller() {
    let test = TestBroker::new().await;

    let response = AxumTestRequest::get("/health").send(router(&test)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "agent-broker");
}

#[tokio::test]
async fn test_missing_or_blank_caller_is_unauthorized() {
    let test = TestBroker::new().await;

    let missing = AxumTestRequest::get("/v1/credentials")
        .send(router(&test))
        .await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = missing.json();
    assert_eq!(body["code"], "auth_required");

    let blank = AxumTestRequest::get("/v1/agents")
        .header(CALLER_HEADER, "   ")
        .send(router(&test))
        .await;
    assert_eq!(blank.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_list_credentials() {
    let test = TestBroker::new().await;

    let created = AxumTestRequest::post("/v1/credentials")
        .header(CALLER_HEADER, "owner-1")
        .json(&json!({
            "owner_user_id": "spoofed",
            "provider": "openai",
            "label": "Main key",
            "secret": "sk-route-secret"
        }))
        .send(router(&test))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    assert!(!created.text().contains("sk-route-secret"));
    let credential: Value = created.json();
    assert_eq!(credential["owner_user_id"], "owner-1");
    assert_eq!(credential["status"], "active");

    let listed = AxumTestRequest::get("/v1/credentials?page_size=5")
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    assert_eq!(listed.status_code(), StatusCode::OK);
    let page: Value = listed.json();
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["id"], credential["id"]);

    let other = AxumTestRequest::get("/v1/credentials")
        .header(CALLER_HEADER, "owner-2")
        .send(router(&test))
        .await;
    let page: Value = other.json();
    assert!(page["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;

    let invalid = AxumTestRequest::post("/v1/credentials")
        .header(CALLER_HEADER, "owner-1")
        .json(&json!({"provider": "bard", "label": "x", "secret": "s"}))
        .send(router(&test))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = invalid.json();
    assert_eq!(body["code"], "invalid_input");

    let foreign = AxumTestRequest::post(&format!("/v1/credentials/{}/revoke", credential.id))
        .header(CALLER_HEADER, "intruder")
        .send(router(&test))
        .await;
    assert_eq!(foreign.status_code(), StatusCode::NOT_FOUND);

    let revoke_path = format!("/v1/credentials/{}/revoke", credential.id);
    let first = AxumTestRequest::post(&revoke_path)
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let second = AxumTestRequest::post(&revoke_path)
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    assert_eq!(second.status_code(), StatusCode::PRECONDITION_FAILED);
    let body: Value = second.json();
    assert_eq!(body["code"], "failed_precondition");
}

#[tokio::test]
async fn test_share_flow_over_http() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk-owner").await;

    let agent: Value = AxumTestRequest::post("/v1/agents")
        .header(CALLER_HEADER, "owner-1")
        .json(&json!({
            "name": "Writer",
            "provider": "openai",
            "model": "gpt-4o-mini",
            "credential_id": credential.id
        }))
        .send(router(&test))
        .await
        .json();
    let agent_id = agent["id"].as_str().unwrap().to_owned();

    let request = AxumTestRequest::post("/v1/access-requests")
        .header(CALLER_HEADER, "u2")
        .json(&json!({"owner_user_id": "owner-1", "agent_id": agent_id}))
        .send(router(&test))
        .await;
    assert_eq!(request.status_code(), StatusCode::CREATED);
    let request: Value = request.json();
    let request_id = request["id"].as_str().unwrap().to_owned();

    let pending = AxumTestRequest::get("/v1/access-requests?role=owner")
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    let pending: Value = pending.json();
    assert_eq!(pending["items"][0]["status"], "pending");

    let approved = AxumTestRequest::post(&format!("/v1/access-requests/{request_id}/review"))
        .header(CALLER_HEADER, "owner-1")
        .json(&json!({"decision": "approve"}))
        .send(router(&test))
        .await;
    assert_eq!(approved.status_code(), StatusCode::OK);

    let shared = AxumTestRequest::get(&format!("/v1/agents/accessible/{agent_id}"))
        .header(CALLER_HEADER, "u2")
        .send(router(&test))
        .await;
    assert_eq!(shared.status_code(), StatusCode::OK);
    let shared: Value = shared.json();
    assert_eq!(shared["access"], "shared");

    let invoked = AxumTestRequest::post(&format!("/v1/agents/{agent_id}/invoke"))
        .header(CALLER_HEADER, "u2")
        .json(&json!({"input": "hello"}))
        .send(router(&test))
        .await;
    assert_eq!(invoked.status_code(), StatusCode::OK);
    assert!(!invoked.text().contains("sk-owner"));
    let invoked: Value = invoked.json();
    assert_eq!(invoked["output_text"], "echo: hello");

    let revoked = AxumTestRequest::post(&format!("/v1/access-requests/{request_id}/revoke"))
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    assert_eq!(revoked.status_code(), StatusCode::OK);

    let blocked = AxumTestRequest::post(&format!("/v1/agents/{agent_id}/invoke"))
        .header(CALLER_HEADER, "u2")
        .json(&json!({"input": "again"}))
        .send(router(&test))
        .await;
    assert_eq!(blocked.status_code(), StatusCode::NOT_FOUND);

    let events = AxumTestRequest::get("/v1/audit-events?event_name=agent.invoke.shared")
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    let events: Value = events.json();
    assert_eq!(events["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connect_flow_over_http() {
    let test = TestBroker::new().await;

    let started = AxumTestRequest::post("/v1/provider-grants/connect")
        .header(CALLER_HEADER, "owner-1")
        .json(&json!({"provider": "anthropic", "requested_scopes": ["inference"]}))
        .send(router(&test))
        .await;
    assert_eq!(started.status_code(), StatusCode::CREATED);
    let started: Value = started.json();
    let session_id = started["session_id"].as_str().unwrap();

    let finished = AxumTestRequest::post(&format!(
        "/v1/provider-grants/connect/{session_id}/finish"
    ))
    .header(CALLER_HEADER, "owner-1")
    .json(&json!({"state": started["state"], "code": "auth-code"}))
    .send(router(&test))
    .await;
    assert_eq!(finished.status_code(), StatusCode::CREATED);
    assert!(!finished.text().contains("access-1"));
    let grant: Value = finished.json();
    assert_eq!(grant["status"], "active");

    let listed = AxumTestRequest::get("/v1/provider-grants?status=active")
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    let listed: Value = listed.json();
    assert_eq!(listed["items"][0]["id"], grant["id"]);

    let delete_unknown = AxumTestRequest::delete("/v1/agents/no-such-agent")
        .header(CALLER_HEADER, "owner-1")
        .send(router(&test))
        .await;
    assert_eq!(delete_unknown.status_code(), StatusCode::NOT_FOUND);
}
