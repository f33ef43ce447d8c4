// ABOUTME: Integration tests for the access request workflow and shared invocation
// ABOUTME: Covers owner-only review, one-way transitions and immediate effect of revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agent_broker::broker::{
    BrokerStores, InvokeAgentInput, ListAuditEventsInput, ReviewAccessRequestInput,
};
use agent_broker::database::{AccessRequestStore, Database, DatabaseError};
use agent_broker::errors::{AppError, ErrorCode};
use agent_broker::pagination::{Page, PageRequest};
use agent_broker::providers::AdapterRegistry;
use async_trait::async_trait;
use broker_core::models::{
    AccessRequest, AccessRequestRole, AccessRequestStatus, AgentAccess, AuditEventName,
    CreateAccessRequestInput, ReviewDecision,
};
use broker_core::Clock;
use common::TestBroker;

async fn shared_agent(test: &TestBroker) -> String {
    let credential = test.credential("owner-1", "openai", "cred-1-secret").await;
    test.credential_agent("owner-1", "Writer", &credential.id)
        .await
        .id
}

async fn pending_request(test: &TestBroker, requester: &str, agent_id: &str) -> AccessRequest {
    test.service
        .create_access_request(
            requester,
            CreateAccessRequestInput {
                requester_user_id: String::new(),
                owner_user_id: "owner-1".to_owned(),
                agent_id: agent_id.to_owned(),
                scope: String::new(),
                request_note: Some("need it for drafts".to_owned()),
            },
        )
        .await
        .unwrap()
}

fn decision(value: &str) -> ReviewAccessRequestInput {
    ReviewAccessRequestInput {
        decision: value.to_owned(),
        note: Some("ok".to_owned()),
    }
}

fn prompt(text: &str) -> InvokeAgentInput {
    InvokeAgentInput {
        input: text.to_owned(),
    }
}

#[tokio::test]
async fn test_create_request_validates_target() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;

    let request = pending_request(&test, "u2", &agent_id).await;
    assert_eq!(request.status, AccessRequestStatus::Pending);
    assert_eq!(request.requester_user_id, "u2");

    let self_request = test
        .service
        .create_access_request(
            "owner-1",
            CreateAccessRequestInput {
                requester_user_id: String::new(),
                owner_user_id: "owner-1".to_owned(),
                agent_id: agent_id.clone(),
                scope: String::new(),
                request_note: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(self_request.code, ErrorCode::InvalidInput);

    let wrong_owner = test
        .service
        .create_access_request(
            "u2",
            CreateAccessRequestInput {
                requester_user_id: String::new(),
                owner_user_id: "owner-9".to_owned(),
                agent_id: agent_id.clone(),
                scope: String::new(),
                request_note: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(wrong_owner.code, ErrorCode::ResourceNotFound);

    let bad_scope = test
        .service
        .create_access_request(
            "u2",
            CreateAccessRequestInput {
                requester_user_id: String::new(),
                owner_user_id: "owner-1".to_owned(),
                agent_id,
                scope: "admin".to_owned(),
                request_note: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(bad_scope.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_only_owner_reviews_and_review_is_one_way() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let request = pending_request(&test, "u2", &agent_id).await;

    let by_requester = test
        .service
        .review_access_request("u2", &request.id, decision("approve"))
        .await
        .unwrap_err();
    assert_eq!(by_requester.code, ErrorCode::ResourceNotFound);

    let denied = test
        .service
        .review_access_request("owner-1", &request.id, decision("deny"))
        .await
        .unwrap();
    assert_eq!(denied.status, AccessRequestStatus::Denied);
    assert!(denied.reviewed_at.is_some());

    let flip = test
        .service
        .review_access_request("owner-1", &request.id, decision("approve"))
        .await
        .unwrap_err();
    assert_eq!(flip.code, ErrorCode::FailedPrecondition);

    let revoke_denied = test
        .service
        .revoke_access_request("owner-1", &request.id, None)
        .await
        .unwrap_err();
    assert_eq!(revoke_denied.code, ErrorCode::FailedPrecondition);
}

#[tokio::test]
async fn test_unknown_decision_is_invalid() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let request = pending_request(&test, "u2", &agent_id).await;

    let err = test
        .service
        .review_access_request("owner-1", &request.id, decision("maybe"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_list_requests_by_role() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let request = pending_request(&test, "u2", &agent_id).await;

    let as_requester = test
        .service
        .list_access_requests("u2", AccessRequestRole::Requester, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(as_requester.items.len(), 1);
    assert_eq!(as_requester.items[0].id, request.id);

    let as_owner = test
        .service
        .list_access_requests("owner-1", AccessRequestRole::Owner, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(as_owner.items.len(), 1);

    let wrong_side = test
        .service
        .list_access_requests("u2", AccessRequestRole::Owner, &PageRequest::default())
        .await
        .unwrap();
    assert!(wrong_side.items.is_empty());
}

#[tokio::test]
async fn test_shared_invoke_is_audited_and_stops_after_revoke() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let approved = test.approved_access("u2", "owner-1", &agent_id).await;
    assert_eq!(approved.status, AccessRequestStatus::Approved);

    let output = test
        .service
        .invoke_agent("u2", &agent_id, prompt("draft a haiku"))
        .await
        .unwrap();
    assert_eq!(output.access, AgentAccess::Shared);
    assert_eq!(output.output_text, "echo: draft a haiku");
    assert_eq!(test.openai.last_call().unwrap().secret, "cred-1-secret");

    let shared_events = test
        .service
        .list_audit_events(
            "owner-1",
            ListAuditEventsInput {
                event_name: Some("agent.invoke.shared".to_owned()),
                ..ListAuditEventsInput::default()
            },
            &PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(shared_events.items.len(), 1);
    let event = &shared_events.items[0];
    assert_eq!(event.event_name, AuditEventName::AgentInvokeShared);
    assert_eq!(event.actor_user_id, "u2");
    assert_eq!(event.requester_user_id.as_deref(), Some("u2"));
    assert_eq!(event.agent_id.as_deref(), Some(agent_id.as_str()));
    assert_eq!(event.access_request_id.as_deref(), Some(approved.id.as_str()));

    let revoked = test
        .service
        .revoke_access_request("owner-1", &approved.id, Some("project over"))
        .await
        .unwrap();
    assert_eq!(revoked.status, AccessRequestStatus::Revoked);

    let err = test
        .service
        .invoke_agent("u2", &agent_id, prompt("one more"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    assert_eq!(test.openai.call_count(), 1);

    let again = test
        .service
        .revoke_access_request("owner-1", &approved.id, None)
        .await
        .unwrap_err();
    assert_eq!(again.code, ErrorCode::FailedPrecondition);
}

#[tokio::test]
async fn test_owner_invoke_is_not_audited() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;

    let output = test
        .service
        .invoke_agent("owner-1", &agent_id, prompt("hello"))
        .await
        .unwrap();
    assert_eq!(output.access, AgentAccess::Owner);

    let shared_events = test
        .service
        .list_audit_events(
            "owner-1",
            ListAuditEventsInput {
                event_name: Some("agent.invoke.shared".to_owned()),
                ..ListAuditEventsInput::default()
            },
            &PageRequest::default(),
        )
        .await
        .unwrap();
    assert!(shared_events.items.is_empty());
}

#[tokio::test]
async fn test_pending_request_does_not_authorize_invoke() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    pending_request(&test, "u2", &agent_id).await;

    let err = test
        .service
        .invoke_agent("u2", &agent_id, prompt("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
    assert_eq!(test.openai.call_count(), 0);
}

#[tokio::test]
async fn test_review_and_revoke_record_reviewer_and_keep_review_note() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let request = pending_request(&test, "u2", &agent_id).await;
    assert!(request.reviewer_user_id.is_none());

    let approved = test
        .service
        .review_access_request("owner-1", &request.id, decision("approve"))
        .await
        .unwrap();
    assert_eq!(approved.reviewer_user_id.as_deref(), Some("owner-1"));
    assert_eq!(approved.review_note, "ok");
    assert!(approved.revoke_note.is_empty());

    test.service
        .revoke_access_request("owner-1", &request.id, Some("bye"))
        .await
        .unwrap();

    let stored = AccessRequestStore::get(&test.database, &request.id)
        .await
        .unwrap();
    assert_eq!(stored.status, AccessRequestStatus::Revoked);
    assert_eq!(stored.reviewer_user_id.as_deref(), Some("owner-1"));
    assert_eq!(stored.review_note, "ok");
    assert_eq!(stored.revoke_note, "bye");
    assert_eq!(stored.request_note, "need it for drafts");
    assert!(stored.revoked_at.is_some());
}

#[tokio::test]
async fn test_second_writer_from_same_status_conflicts() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let request = pending_request(&test, "u2", &agent_id).await;
    let now = test.clock.now();

    let approved = request
        .reviewed("owner-1", ReviewDecision::Approve, None, now)
        .unwrap();
    let denied = request
        .reviewed("owner-1", ReviewDecision::Deny, None, now)
        .unwrap();
    test.database
        .transition(&approved, AccessRequestStatus::Pending)
        .await
        .unwrap();

    let err = test
        .database
        .transition(&denied, AccessRequestStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict { .. }));
    assert_eq!(
        AppError::from(err).conflict_as_precondition().code,
        ErrorCode::FailedPrecondition
    );

    let stored = AccessRequestStore::get(&test.database, &request.id)
        .await
        .unwrap();
    assert_eq!(stored.status, AccessRequestStatus::Approved);
}

/// Lets another owner session deny the request between the service's read and its write
struct DeniedMeanwhile {
    inner: Database,
    raced: AtomicBool,
}

#[async_trait]
impl AccessRequestStore for DeniedMeanwhile {
    async fn insert(&self, request: &AccessRequest) -> Result<(), DatabaseError> {
        AccessRequestStore::insert(&self.inner, request).await
    }

    async fn get(&self, id: &str) -> Result<AccessRequest, DatabaseError> {
        AccessRequestStore::get(&self.inner, id).await
    }

    async fn list(
        &self,
        user_id: &str,
        role: AccessRequestRole,
        page: &PageRequest,
    ) -> Result<Page<AccessRequest>, DatabaseError> {
        AccessRequestStore::list(&self.inner, user_id, role, page).await
    }

    async fn transition(
        &self,
        updated: &AccessRequest,
        expected: AccessRequestStatus,
    ) -> Result<(), DatabaseError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let current = AccessRequestStore::get(&self.inner, &updated.id).await?;
            let denied = current
                .reviewed(
                    &current.owner_user_id,
                    ReviewDecision::Deny,
                    Some("first"),
                    updated.updated_at,
                )
                .unwrap();
            self.inner
                .transition(&denied, AccessRequestStatus::Pending)
                .await?;
        }
        self.inner.transition(updated, expected).await
    }

    async fn find_approved_invoke(
        &self,
        requester_user_id: &str,
        owner_user_id: &str,
        agent_id: &str,
    ) -> Result<Option<AccessRequest>, DatabaseError> {
        self.inner
            .find_approved_invoke(requester_user_id, owner_user_id, agent_id)
            .await
    }

    async fn list_approved_invoke_for_requester(
        &self,
        requester_user_id: &str,
    ) -> Result<Vec<AccessRequest>, DatabaseError> {
        self.inner
            .list_approved_invoke_for_requester(requester_user_id)
            .await
    }
}

#[tokio::test]
async fn test_review_losing_concurrent_review_is_failed_precondition() {
    let test = TestBroker::new().await;
    let agent_id = shared_agent(&test).await;
    let request = pending_request(&test, "u2", &agent_id).await;

    let racing = test.service_with(
        BrokerStores {
            access_requests: Arc::new(DeniedMeanwhile {
                inner: test.database.clone(),
                raced: AtomicBool::new(false),
            }),
            ..test.stores()
        },
        AdapterRegistry::new(),
    );

    let err = racing
        .review_access_request("owner-1", &request.id, decision("approve"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FailedPrecondition);

    let stored = AccessRequestStore::get(&test.database, &request.id)
        .await
        .unwrap();
    assert_eq!(stored.status, AccessRequestStatus::Denied);
    assert_eq!(stored.review_note, "first");

    let err = test
        .service
        .invoke_agent("u2", &agent_id, prompt("hello"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}
