// ABOUTME: Integration tests for agent invocation
// ABOUTME: Covers secret resolution, adapter dispatch, output validation and access checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use agent_broker::broker::InvokeAgentInput;
use agent_broker::errors::ErrorCode;
use agent_broker::providers::SecretKind;
use broker_core::models::AgentAccess;
use common::TestBroker;

fn prompt(text: &str) -> InvokeAgentInput {
    InvokeAgentInput {
        input: text.to_owned(),
    }
}

#[tokio::test]
async fn test_owner_invoke_dispatches_with_api_key() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk-live").await;
    let agent = test
        .credential_agent("owner-1", "Writer", &credential.id)
        .await;

    let output = test
        .service
        .invoke_agent("owner-1", &agent.id, prompt("  summarize this  "))
        .await
        .unwrap();
    assert_eq!(output.agent_id, agent.id);
    assert_eq!(output.access, AgentAccess::Owner);
    assert_eq!(output.output_text, "echo: summarize this");

    let call = test.openai.last_call().unwrap();
    assert_eq!(call.model, "gpt-4o-mini");
    assert_eq!(call.secret, "sk-live");
    assert_eq!(call.secret_kind, SecretKind::ApiKey);
    assert_eq!(test.anthropic.call_count(), 0);
}

#[tokio::test]
async fn test_blank_input_is_rejected_before_dispatch() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    let agent = test
        .credential_agent("owner-1", "Writer", &credential.id)
        .await;

    let err = test
        .service
        .invoke_agent("owner-1", &agent.id, prompt("   "))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert_eq!(test.openai.call_count(), 0);
}

#[tokio::test]
async fn test_empty_provider_output_is_an_internal_error() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    let agent = test
        .credential_agent("owner-1", "Writer", &credential.id)
        .await;
    test.openai.return_empty_output(true);

    let err = test
        .service
        .invoke_agent("owner-1", &agent.id, prompt("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
}

#[tokio::test]
async fn test_revoked_credential_blocks_invocation() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    let agent = test
        .credential_agent("owner-1", "Writer", &credential.id)
        .await;
    test.service
        .revoke_credential("owner-1", &credential.id)
        .await
        .unwrap();

    let err = test
        .service
        .invoke_agent("owner-1", &agent.id, prompt("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    assert_eq!(test.openai.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_and_unshared_agents_look_the_same() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    let agent = test
        .credential_agent("owner-1", "Writer", &credential.id)
        .await;

    let unshared = test
        .service
        .invoke_agent("stranger", &agent.id, prompt("hello"))
        .await
        .unwrap_err();
    let unknown = test
        .service
        .invoke_agent("stranger", "no-such-agent", prompt("hello"))
        .await
        .unwrap_err();
    assert_eq!(unshared.code, ErrorCode::ResourceNotFound);
    assert_eq!(unshared.message, unknown.message);
    assert_eq!(test.openai.call_count(), 0);
}

#[tokio::test]
async fn test_shared_invoke_uses_owner_secret_and_never_exposes_it() {
    let test = TestBroker::new().await;
    let grant = test.connected_grant("owner-1").await;
    let agent = test.grant_agent("owner-1", "Claude", &grant.id).await;
    test.approved_access("u2", "owner-1", &agent.id).await;

    let output = test
        .service
        .invoke_agent("u2", &agent.id, prompt("hi"))
        .await
        .unwrap();
    assert_eq!(output.access, AgentAccess::Shared);

    let call = test.anthropic.last_call().unwrap();
    assert_eq!(call.model, "claude-sonnet-4");
    assert_eq!(call.secret, "access-1");
    assert_eq!(call.secret_kind, SecretKind::OAuthAccessToken);

    let serialized = serde_json::to_string(&output).unwrap();
    assert!(!serialized.contains("access-1"));
}

#[tokio::test]
async fn test_deleted_agent_cannot_be_invoked() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    let agent = test
        .credential_agent("owner-1", "Writer", &credential.id)
        .await;
    test.service.delete_agent("owner-1", &agent.id).await.unwrap();

    let err = test
        .service
        .invoke_agent("owner-1", &agent.id, prompt("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}
