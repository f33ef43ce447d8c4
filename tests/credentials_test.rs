// ABOUTME: Integration tests for the credential lifecycle
// ABOUTME: Covers sealing at rest, owner scoping, pagination and one-way revoke
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agent_broker::broker::BrokerStores;
use agent_broker::database::{CredentialStore, Database, DatabaseError};
use agent_broker::errors::ErrorCode;
use agent_broker::pagination::{Page, PageRequest};
use agent_broker::providers::AdapterRegistry;
use async_trait::async_trait;
use axum::http::StatusCode;
use broker_core::models::{
    AuditEventName, CreateCredentialInput, Credential, CredentialStatus, Provider,
};
use broker_core::Clock;
use chrono::{DateTime, Utc};
use common::TestBroker;

#[tokio::test]
async fn test_create_credential_seals_secret() {
    let test = TestBroker::new().await;

    let summary = test.credential("owner-1", "openai", "sk-live-123").await;
    assert_eq!(summary.owner_user_id, "owner-1");
    assert_eq!(summary.provider, Provider::OpenAi);
    assert_eq!(summary.status, CredentialStatus::Active);

    let stored = CredentialStore::get(&test.database, "owner-1", &summary.id)
        .await
        .unwrap();
    assert!(!stored.secret_ciphertext.is_empty());
    assert!(!stored.secret_ciphertext.contains("sk-live-123"));

    let serialized = serde_json::to_string(&summary).unwrap();
    assert!(!serialized.contains("sk-live-123"));
    assert!(!serialized.contains(&stored.secret_ciphertext));
}

#[tokio::test]
async fn test_create_credential_rejects_bad_input() {
    let test = TestBroker::new().await;

    let unsupported = test
        .service
        .create_credential(
            "owner-1",
            CreateCredentialInput {
                owner_user_id: String::new(),
                provider: "bard".to_owned(),
                label: "x".to_owned(),
                secret: "s".to_owned(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(unsupported.code, ErrorCode::InvalidInput);

    let blank_secret = test
        .service
        .create_credential(
            "owner-1",
            CreateCredentialInput {
                owner_user_id: String::new(),
                provider: "openai".to_owned(),
                label: "x".to_owned(),
                secret: "   ".to_owned(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(blank_secret.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn test_caller_identity_overrides_body_owner() {
    let test = TestBroker::new().await;

    let summary = test
        .service
        .create_credential(
            "owner-1",
            CreateCredentialInput {
                owner_user_id: "someone-else".to_owned(),
                provider: "anthropic".to_owned(),
                label: "Main".to_owned(),
                secret: "sk-ant".to_owned(),
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.owner_user_id, "owner-1");
}

#[tokio::test]
async fn test_list_credentials_is_owner_scoped_and_paginated() {
    let test = TestBroker::new().await;
    let first = test.credential("owner-1", "openai", "a").await;
    let second = test.credential("owner-1", "anthropic", "b").await;
    let third = test.credential("owner-1", "openai", "c").await;
    test.credential("owner-2", "openai", "d").await;

    let page = test
        .service
        .list_credentials("owner-1", &PageRequest::first(2))
        .await
        .unwrap();
    let ids: Vec<_> = page.items.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);
    assert_eq!(page.next_page_token.as_deref(), Some(second.id.as_str()));

    let next = test
        .service
        .list_credentials("owner-1", &PageRequest::after(2, second.id))
        .await
        .unwrap();
    assert_eq!(next.items.len(), 1);
    assert_eq!(next.items[0].id, third.id);
    assert!(next.next_page_token.is_none());
}

#[tokio::test]
async fn test_revoke_credential_is_one_way() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;

    let revoked = test
        .service
        .revoke_credential("owner-1", &credential.id)
        .await
        .unwrap();
    assert_eq!(revoked.status, CredentialStatus::Revoked);
    assert!(revoked.revoked_at.is_some());

    let again = test
        .service
        .revoke_credential("owner-1", &credential.id)
        .await
        .unwrap_err();
    assert_eq!(again.code, ErrorCode::FailedPrecondition);
}

#[tokio::test]
async fn test_revoke_foreign_credential_looks_absent() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;

    let err = test
        .service
        .revoke_credential("intruder", &credential.id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);

    let missing = test
        .service
        .revoke_credential("owner-1", "no-such-id")
        .await
        .unwrap_err();
    assert_eq!(missing.code, ErrorCode::ResourceNotFound);
    assert_eq!(err.message, missing.message);
}

#[tokio::test]
async fn test_credential_lifecycle_is_audited() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    test.service
        .revoke_credential("owner-1", &credential.id)
        .await
        .unwrap();

    let events = test
        .service
        .list_audit_events("owner-1", Default::default(), &PageRequest::default())
        .await
        .unwrap();
    let names: Vec<_> = events.items.iter().map(|e| e.event_name).collect();
    assert_eq!(
        names,
        vec![
            AuditEventName::CredentialCreated,
            AuditEventName::CredentialRevoked
        ]
    );
    let expected_resource = format!("credential:{}", credential.id);
    assert!(events
        .items
        .iter()
        .all(|e| e.resource.as_deref() == Some(expected_resource.as_str())));
}

#[tokio::test]
async fn test_store_revoke_after_concurrent_revoke_conflicts() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;
    let now = test.clock.now();

    CredentialStore::revoke(&test.database, "owner-1", &credential.id, now)
        .await
        .unwrap();
    let err = CredentialStore::revoke(&test.database, "owner-1", &credential.id, now)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict { .. }));

    let foreign = CredentialStore::revoke(&test.database, "intruder", &credential.id, now)
        .await
        .unwrap_err();
    assert!(matches!(foreign, DatabaseError::NotFound { .. }));
}

/// Revokes the credential through a second writer right before the service's own update
struct RevokedMeanwhile {
    inner: Database,
    raced: AtomicBool,
}

#[async_trait]
impl CredentialStore for RevokedMeanwhile {
    async fn insert(&self, credential: &Credential) -> Result<(), DatabaseError> {
        CredentialStore::insert(&self.inner, credential).await
    }

    async fn get(&self, owner_user_id: &str, id: &str) -> Result<Credential, DatabaseError> {
        CredentialStore::get(&self.inner, owner_user_id, id).await
    }

    async fn list(
        &self,
        owner_user_id: &str,
        page: &PageRequest,
    ) -> Result<Page<Credential>, DatabaseError> {
        CredentialStore::list(&self.inner, owner_user_id, page).await
    }

    async fn revoke(
        &self,
        owner_user_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, DatabaseError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            CredentialStore::revoke(&self.inner, owner_user_id, id, now).await?;
        }
        CredentialStore::revoke(&self.inner, owner_user_id, id, now).await
    }
}

#[tokio::test]
async fn test_revoke_losing_concurrent_revoke_is_conflict() {
    let test = TestBroker::new().await;
    let credential = test.credential("owner-1", "openai", "sk").await;

    let racing = test.service_with(
        BrokerStores {
            credentials: Arc::new(RevokedMeanwhile {
                inner: test.database.clone(),
                raced: AtomicBool::new(false),
            }),
            ..test.stores()
        },
        AdapterRegistry::new(),
    );

    let err = racing
        .revoke_credential("owner-1", &credential.id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
    assert_eq!(err.http_status(), StatusCode::CONFLICT);

    let stored = CredentialStore::get(&test.database, "owner-1", &credential.id)
        .await
        .unwrap();
    assert_eq!(stored.status, CredentialStatus::Revoked);
}
