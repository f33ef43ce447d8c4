// ABOUTME: Append-only audit event records for sharing, invocation and secret lifecycle actions
// ABOUTME: AuditEventName, AuditOutcome and AuditEventRecord with builder and per-event field rules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, IdGenerator};
use crate::errors::{DomainError, DomainResult};
use crate::validation::optional;

/// Kinds of audit events recorded by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventName {
    // Sharing workflow
    /// A user asked for invoke access to another user's agent
    #[serde(rename = "access_request.created")]
    AccessRequestCreated,
    /// The owner approved or denied a request
    #[serde(rename = "access_request.reviewed")]
    AccessRequestReviewed,
    /// The owner withdrew an approval
    #[serde(rename = "access_request.revoked")]
    AccessRequestRevoked,
    /// A non-owner invoked an agent through an approved request
    #[serde(rename = "agent.invoke.shared")]
    AgentInvokeShared,

    // Secret lifecycle
    /// Static credential stored
    #[serde(rename = "credential.created")]
    CredentialCreated,
    /// Static credential revoked
    #[serde(rename = "credential.revoked")]
    CredentialRevoked,
    /// OAuth grant created by a finished connect
    #[serde(rename = "provider_grant.created")]
    ProviderGrantCreated,
    /// OAuth grant refresh attempted
    #[serde(rename = "provider_grant.refreshed")]
    ProviderGrantRefreshed,
    /// OAuth grant revoked
    #[serde(rename = "provider_grant.revoked")]
    ProviderGrantRevoked,

    // Agent registry
    /// Agent profile created
    #[serde(rename = "agent.created")]
    AgentCreated,
    /// Agent profile changed
    #[serde(rename = "agent.updated")]
    AgentUpdated,
    /// Agent profile deleted
    #[serde(rename = "agent.deleted")]
    AgentDeleted,
}

impl AuditEventName {
    /// Every event name
    pub const ALL: [Self; 12] = [
        Self::AccessRequestCreated,
        Self::AccessRequestReviewed,
        Self::AccessRequestRevoked,
        Self::AgentInvokeShared,
        Self::CredentialCreated,
        Self::CredentialRevoked,
        Self::ProviderGrantCreated,
        Self::ProviderGrantRefreshed,
        Self::ProviderGrantRevoked,
        Self::AgentCreated,
        Self::AgentUpdated,
        Self::AgentDeleted,
    ];

    /// Dotted storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessRequestCreated => "access_request.created",
            Self::AccessRequestReviewed => "access_request.reviewed",
            Self::AccessRequestRevoked => "access_request.revoked",
            Self::AgentInvokeShared => "agent.invoke.shared",
            Self::CredentialCreated => "credential.created",
            Self::CredentialRevoked => "credential.revoked",
            Self::ProviderGrantCreated => "provider_grant.created",
            Self::ProviderGrantRefreshed => "provider_grant.refreshed",
            Self::ProviderGrantRevoked => "provider_grant.revoked",
            Self::AgentCreated => "agent.created",
            Self::AgentUpdated => "agent.updated",
            Self::AgentDeleted => "agent.deleted",
        }
    }

    const fn needs_requester(self) -> bool {
        matches!(
            self,
            Self::AccessRequestCreated
                | Self::AccessRequestReviewed
                | Self::AccessRequestRevoked
                | Self::AgentInvokeShared
        )
    }

    const fn needs_agent(self) -> bool {
        matches!(
            self,
            Self::AccessRequestCreated
                | Self::AccessRequestReviewed
                | Self::AccessRequestRevoked
                | Self::AgentInvokeShared
                | Self::AgentCreated
                | Self::AgentUpdated
                | Self::AgentDeleted
        )
    }

    const fn needs_resource(self) -> bool {
        matches!(
            self,
            Self::CredentialCreated
                | Self::CredentialRevoked
                | Self::ProviderGrantCreated
                | Self::ProviderGrantRefreshed
                | Self::ProviderGrantRevoked
        )
    }
}

impl fmt::Display for AuditEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| DomainError::Unsupported {
                field: "event_name",
                value: value.to_owned(),
            })
    }
}

/// Result of the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Action completed
    Success,
    /// Action attempted and failed
    Failure,
}

impl AuditOutcome {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(DomainError::Unsupported {
                field: "outcome",
                value: other.to_owned(),
            }),
        }
    }
}

/// One audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEventRecord {
    /// Event id
    pub id: String,
    /// Event kind
    pub event_name: AuditEventName,
    /// User who performed the action
    pub actor_user_id: String,
    /// Owner whose audit scope the event belongs to
    pub owner_user_id: String,
    /// Requesting user for sharing events
    pub requester_user_id: Option<String>,
    /// Agent involved
    pub agent_id: Option<String>,
    /// Access request involved
    pub access_request_id: Option<String>,
    /// Credential or provider grant involved (e.g. `credential:<id>`)
    pub resource: Option<String>,
    /// Result
    pub outcome: AuditOutcome,
    /// Event time
    pub created_at: DateTime<Utc>,
}

impl AuditEventRecord {
    /// Start a successful event; identity fields are added with the `with_*` builders
    #[must_use]
    pub fn new(
        event_name: AuditEventName,
        actor_user_id: &str,
        owner_user_id: &str,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Self {
        Self {
            id: ids.next_id(),
            event_name,
            actor_user_id: actor_user_id.to_owned(),
            owner_user_id: owner_user_id.to_owned(),
            requester_user_id: None,
            agent_id: None,
            access_request_id: None,
            resource: None,
            outcome: AuditOutcome::Success,
            created_at: clock.now(),
        }
    }

    /// Set the requesting user
    #[must_use]
    pub fn with_requester(mut self, requester_user_id: &str) -> Self {
        self.requester_user_id = Some(requester_user_id.to_owned());
        self
    }

    /// Set the agent
    #[must_use]
    pub fn with_agent(mut self, agent_id: &str) -> Self {
        self.agent_id = Some(agent_id.to_owned());
        self
    }

    /// Set the access request
    #[must_use]
    pub fn with_access_request(mut self, access_request_id: &str) -> Self {
        self.access_request_id = Some(access_request_id.to_owned());
        self
    }

    /// Set the affected credential or grant
    #[must_use]
    pub fn with_resource(mut self, kind: &str, id: &str) -> Self {
        self.resource = Some(format!("{kind}:{id}"));
        self
    }

    /// Set the outcome
    #[must_use]
    pub const fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Reject events missing an identity field their kind requires
    pub fn validate(&self) -> DomainResult<()> {
        require("id", Some(&self.id))?;
        require("actor_user_id", Some(&self.actor_user_id))?;
        require("owner_user_id", Some(&self.owner_user_id))?;
        if self.event_name.needs_requester() {
            require("requester_user_id", self.requester_user_id.as_ref())?;
            require("access_request_id", self.access_request_id.as_ref())?;
        }
        if self.event_name.needs_agent() {
            require("agent_id", self.agent_id.as_ref())?;
        }
        if self.event_name.needs_resource() {
            require("resource", self.resource.as_ref())?;
        }
        Ok(())
    }
}

fn require(field: &'static str, value: Option<&String>) -> DomainResult<()> {
    optional(value.map(String::as_str))
        .map(|_| ())
        .ok_or(DomainError::MissingField { field })
}

/// Owner-scoped audit query; narrowing filters apply only inside the owner's events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditEventFilter {
    /// Scope; always required
    pub owner_user_id: String,
    /// Only this event kind
    pub event_name: Option<AuditEventName>,
    /// Only this agent
    pub agent_id: Option<String>,
    /// Inclusive lower bound
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub created_before: Option<DateTime<Utc>>,
}

impl AuditEventFilter {
    /// Check the scope is present and the time window is ordered
    pub fn validate(&self) -> DomainResult<()> {
        require("owner_user_id", Some(&self.owner_user_id))?;
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(DomainError::invalid(
                    "created_after must not be later than created_before",
                ));
            }
        }
        Ok(())
    }
}
