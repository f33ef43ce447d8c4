// ABOUTME: Domain model re-exports for credentials, grants, agents, access requests and audit
// ABOUTME: Canonical definitions shared by persistence, services and transport
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

/// Owner-reviewed invoke access requests
pub mod access_request;
/// Agent profiles bound to exactly one auth reference
pub mod agent;
/// Append-only audit event records
pub mod audit;
/// Static provider credentials (API keys)
pub mod credential;
/// Supported AI providers
pub mod provider;
/// OAuth-derived provider grants and connect sessions
pub mod provider_grant;

pub use access_request::{
    AccessRequest, AccessRequestRole, AccessRequestStatus, AccessScope, CreateAccessRequestInput,
    NewAccessRequest, ReviewDecision,
};
pub use agent::{
    Agent, AgentAccess, AgentChanges, AgentStatus, AgentView, AuthReference, CreateAgentInput,
    NewAgent, UpdateAgentInput,
};
pub use audit::{AuditEventFilter, AuditEventName, AuditEventRecord, AuditOutcome};
pub use credential::{
    CreateCredentialInput, Credential, CredentialStatus, CredentialSummary, NewCredential,
};
pub use provider::Provider;
pub use provider_grant::{
    ConnectSessionStatus, GrantDisposition, NewConnectSession, ProviderConnectSession,
    ProviderGrant, ProviderGrantStatus, ProviderGrantSummary, StartConnectInput, TokenPayload,
    CONNECT_SESSION_TTL_MINUTES, REFRESH_WINDOW_SECONDS,
};
