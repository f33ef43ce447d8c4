// ABOUTME: Store interfaces consumed by the broker services, one per record family
// ABOUTME: Each trait stands alone; a single persistence type may implement all of them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::{
    AccessRequest, AccessRequestRole, AccessRequestStatus, Agent, AuditEventFilter,
    AuditEventRecord, Credential, Provider, ProviderConnectSession, ProviderGrant,
    ProviderGrantStatus,
};
use chrono::{DateTime, Utc};

use crate::database::DatabaseError;
use crate::pagination::{Page, PageRequest};

// ================================
// Store Trait Definitions
// ================================

/// Static credential storage (owner-scoped)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new credential
    async fn insert(&self, credential: &Credential) -> Result<(), DatabaseError>;

    /// Fetch a credential owned by `owner_user_id`
    async fn get(&self, owner_user_id: &str, id: &str) -> Result<Credential, DatabaseError>;

    /// List an owner's credentials in id order
    async fn list(
        &self,
        owner_user_id: &str,
        page: &PageRequest,
    ) -> Result<Page<Credential>, DatabaseError>;

    /// `active -> revoked`, guarded on the active status
    async fn revoke(
        &self,
        owner_user_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, DatabaseError>;
}

/// Agent profile storage
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Persist a new agent
    async fn insert(&self, agent: &Agent) -> Result<(), DatabaseError>;

    /// Fetch by id regardless of owner; callers must authorise
    async fn get(&self, id: &str) -> Result<Agent, DatabaseError>;

    /// List an owner's agents in id order
    async fn list_owned(
        &self,
        owner_user_id: &str,
        page: &PageRequest,
    ) -> Result<Page<Agent>, DatabaseError>;

    /// Replace name, model and auth reference of an owned agent
    async fn update(&self, agent: &Agent) -> Result<(), DatabaseError>;

    /// Delete an owned agent
    async fn delete(&self, owner_user_id: &str, id: &str) -> Result<(), DatabaseError>;
}

/// Narrowing filters for grant listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderGrantFilter {
    /// Only this provider
    pub provider: Option<Provider>,
    /// Only this status
    pub status: Option<ProviderGrantStatus>,
}

/// New token material written by a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    /// Sealed token payload
    pub token_ciphertext: String,
    /// Whether a refresh token is still held
    pub refresh_supported: bool,
    /// New access token expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// OAuth provider grant storage (owner-scoped)
#[async_trait]
pub trait ProviderGrantStore: Send + Sync {
    /// Fetch a grant owned by `owner_user_id`
    async fn get(&self, owner_user_id: &str, id: &str) -> Result<ProviderGrant, DatabaseError>;

    /// List an owner's grants in id order
    async fn list(
        &self,
        owner_user_id: &str,
        filter: ProviderGrantFilter,
        page: &PageRequest,
    ) -> Result<Page<ProviderGrant>, DatabaseError>;

    /// Replace tokens and write `status`. Applies only while the grant is not revoked and
    /// still holds the ciphertext `read` was loaded with; otherwise `Conflict`.
    async fn record_refresh_success(
        &self,
        read: &ProviderGrant,
        status: ProviderGrantStatus,
        tokens: RefreshedTokens,
        now: DateTime<Utc>,
    ) -> Result<ProviderGrant, DatabaseError>;

    /// Write `status` and the failure message under the same guard as a success; token
    /// ciphertext is left untouched
    async fn record_refresh_failure(
        &self,
        read: &ProviderGrant,
        status: ProviderGrantStatus,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ProviderGrant, DatabaseError>;

    /// Any non-revoked status `-> revoked`
    async fn revoke(
        &self,
        owner_user_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProviderGrant, DatabaseError>;
}

/// PKCE connect session storage (owner-scoped)
#[async_trait]
pub trait ProviderConnectSessionStore: Send + Sync {
    /// Persist a new pending session
    async fn insert(&self, session: &ProviderConnectSession) -> Result<(), DatabaseError>;

    /// Fetch a session owned by `owner_user_id`
    async fn get(
        &self,
        owner_user_id: &str,
        id: &str,
    ) -> Result<ProviderConnectSession, DatabaseError>;

    /// `pending -> completed` and insert the grant it produced, in one transaction. Succeeds
    /// at most once and only before the session expires.
    async fn complete(
        &self,
        owner_user_id: &str,
        id: &str,
        grant: &ProviderGrant,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

/// Access request storage
#[async_trait]
pub trait AccessRequestStore: Send + Sync {
    /// Persist a new pending request
    async fn insert(&self, request: &AccessRequest) -> Result<(), DatabaseError>;

    /// Fetch by id regardless of party; callers must authorise
    async fn get(&self, id: &str) -> Result<AccessRequest, DatabaseError>;

    /// List requests where `user_id` plays `role`, in id order
    async fn list(
        &self,
        user_id: &str,
        role: AccessRequestRole,
        page: &PageRequest,
    ) -> Result<Page<AccessRequest>, DatabaseError>;

    /// Write `updated`'s status, reviewer, notes and timestamps if the row is still `expected`
    async fn transition(
        &self,
        updated: &AccessRequest,
        expected: AccessRequestStatus,
    ) -> Result<(), DatabaseError>;

    /// The approved invoke request for this exact tuple, if any
    async fn find_approved_invoke(
        &self,
        requester_user_id: &str,
        owner_user_id: &str,
        agent_id: &str,
    ) -> Result<Option<AccessRequest>, DatabaseError>;

    /// Every approved invoke request held by `requester_user_id`
    async fn list_approved_invoke_for_requester(
        &self,
        requester_user_id: &str,
    ) -> Result<Vec<AccessRequest>, DatabaseError>;
}

/// Append-only audit storage
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    /// Append an event
    async fn append(&self, event: &AuditEventRecord) -> Result<(), DatabaseError>;

    /// Owner-scoped listing with optional narrowing filters
    async fn list(
        &self,
        filter: &AuditEventFilter,
        page: &PageRequest,
    ) -> Result<Page<AuditEventRecord>, DatabaseError>;
}
