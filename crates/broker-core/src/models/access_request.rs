// ABOUTME: Cross-user invoke access requests and the pending/approved/denied/revoked state machine
// ABOUTME: Only pending requests can be reviewed and only approved requests can be revoked
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, IdGenerator};
use crate::errors::{DomainError, DomainResult};
use crate::validation::{bounded, optional, required, MAX_NOTE_LEN};

/// What an approved request allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    /// Call the agent
    Invoke,
}

impl AccessScope {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoke => "invoke",
        }
    }

    /// Parse a caller-supplied scope; blank defaults to `invoke`
    pub fn parse_or_default(value: &str) -> DomainResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::Invoke);
        }
        value.parse()
    }
}

impl FromStr for AccessScope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "invoke" => Ok(Self::Invoke),
            _ => Err(DomainError::Unsupported {
                field: "scope",
                value: s.trim().to_owned(),
            }),
        }
    }
}

/// Owner decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Grant access
    Approve,
    /// Refuse access
    Deny,
}

impl FromStr for ReviewDecision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "" => Err(DomainError::MissingField { field: "decision" }),
            "approve" | "approved" => Ok(Self::Approve),
            "deny" | "denied" => Ok(Self::Deny),
            _ => Err(DomainError::Unsupported {
                field: "decision",
                value: value.to_owned(),
            }),
        }
    }
}

/// Access request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestStatus {
    /// Awaiting owner review
    Pending,
    /// Requester may invoke
    Approved,
    /// Refused; terminal
    Denied,
    /// Approval withdrawn; terminal
    Revoked,
}

impl AccessRequestStatus {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Revoked => "revoked",
        }
    }

    /// `pending -> approved | denied`
    pub fn review(self, decision: ReviewDecision) -> DomainResult<Self> {
        match (self, decision) {
            (Self::Pending, ReviewDecision::Approve) => Ok(Self::Approved),
            (Self::Pending, ReviewDecision::Deny) => Ok(Self::Denied),
            (Self::Approved | Self::Denied | Self::Revoked, _) => {
                Err(DomainError::InvalidTransition {
                    entity: "access request",
                    from: self.as_str().to_owned(),
                    action: "reviewed",
                })
            }
        }
    }

    /// `approved -> revoked`
    pub fn revoke(self) -> DomainResult<Self> {
        match self {
            Self::Approved => Ok(Self::Revoked),
            Self::Pending | Self::Denied | Self::Revoked => Err(DomainError::InvalidTransition {
                entity: "access request",
                from: self.as_str().to_owned(),
                action: "revoked",
            }),
        }
    }
}

impl fmt::Display for AccessRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessRequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "revoked" => Ok(Self::Revoked),
            other => Err(DomainError::Unsupported {
                field: "access request status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Which side of the request the lister is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestRole {
    /// Requests the caller made
    #[default]
    Requester,
    /// Requests addressed to the caller's agents
    Owner,
}

impl FromStr for AccessRequestRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "" | "requester" => Ok(Self::Requester),
            "owner" => Ok(Self::Owner),
            _ => Err(DomainError::Unsupported {
                field: "role",
                value: value.to_owned(),
            }),
        }
    }
}

/// Stored access request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Record id
    pub id: String,
    /// User asking for access
    pub requester_user_id: String,
    /// Agent owner who reviews
    pub owner_user_id: String,
    /// Target agent
    pub agent_id: String,
    /// Requested scope
    pub scope: AccessScope,
    /// Status
    pub status: AccessRequestStatus,
    /// Requester's note
    pub request_note: String,
    /// Owner who reviewed the request
    pub reviewer_user_id: Option<String>,
    /// Owner's note on review
    pub review_note: String,
    /// Owner's note on revoke
    pub revoke_note: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Review time
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Revocation time
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    /// Whether this row lets `requester` invoke `agent_id` owned by `owner`
    #[must_use]
    pub fn authorizes_invoke(&self, requester: &str, owner: &str, agent_id: &str) -> bool {
        self.status == AccessRequestStatus::Approved
            && self.scope == AccessScope::Invoke
            && self.requester_user_id == requester
            && self.owner_user_id == owner
            && self.agent_id == agent_id
    }

    /// The reviewed record; fails unless currently pending
    pub fn reviewed(
        &self,
        reviewer: &str,
        decision: ReviewDecision,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let status = self.status.review(decision)?;
        Ok(Self {
            status,
            reviewer_user_id: Some(required("reviewer_user_id", reviewer)?),
            review_note: note_or_empty("review_note", note)?,
            updated_at: now,
            reviewed_at: Some(now),
            ..self.clone()
        })
    }

    /// The revoked record; fails unless currently approved. The review note is kept.
    pub fn revoked(&self, note: Option<&str>, now: DateTime<Utc>) -> DomainResult<Self> {
        let status = self.status.revoke()?;
        Ok(Self {
            status,
            revoke_note: note_or_empty("revoke_note", note)?,
            updated_at: now,
            revoked_at: Some(now),
            ..self.clone()
        })
    }
}

fn note_or_empty(field: &'static str, note: Option<&str>) -> DomainResult<String> {
    optional(note).map_or_else(
        || Ok(String::new()),
        |note| bounded(field, note, MAX_NOTE_LEN),
    )
}

/// Raw create request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAccessRequestInput {
    /// Requesting user (taken from the trusted caller identity)
    #[serde(default)]
    pub requester_user_id: String,
    /// Agent owner
    pub owner_user_id: String,
    /// Target agent
    pub agent_id: String,
    /// Scope; blank means `invoke`
    #[serde(default)]
    pub scope: String,
    /// Free-text justification
    #[serde(default)]
    pub request_note: Option<String>,
}

/// Validated create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessRequest {
    /// Requesting user
    pub requester_user_id: String,
    /// Agent owner
    pub owner_user_id: String,
    /// Target agent
    pub agent_id: String,
    /// Scope
    pub scope: AccessScope,
    /// Note
    pub request_note: String,
}

impl NewAccessRequest {
    /// Validate a create request; requester and owner must differ
    pub fn normalize(input: CreateAccessRequestInput) -> DomainResult<Self> {
        let requester_user_id = required("requester_user_id", &input.requester_user_id)?;
        let owner_user_id = required("owner_user_id", &input.owner_user_id)?;
        if requester_user_id == owner_user_id {
            return Err(DomainError::invalid(
                "requester_user_id and owner_user_id must differ",
            ));
        }
        let agent_id = required("agent_id", &input.agent_id)?;
        let scope = AccessScope::parse_or_default(&input.scope)?;
        let request_note = optional(input.request_note.as_deref()).map_or_else(
            || Ok(String::new()),
            |note| bounded("request_note", note, MAX_NOTE_LEN),
        )?;
        Ok(Self {
            requester_user_id,
            owner_user_id,
            agent_id,
            scope,
            request_note,
        })
    }

    /// Build the pending record
    #[must_use]
    pub fn create(self, clock: &dyn Clock, ids: &dyn IdGenerator) -> AccessRequest {
        let now = clock.now();
        AccessRequest {
            id: ids.next_id(),
            requester_user_id: self.requester_user_id,
            owner_user_id: self.owner_user_id,
            agent_id: self.agent_id,
            scope: self.scope,
            status: AccessRequestStatus::Pending,
            request_note: self.request_note,
            reviewer_user_id: None,
            review_note: String::new(),
            revoke_note: String::new(),
            created_at: now,
            updated_at: now,
            reviewed_at: None,
            revoked_at: None,
        }
    }
}
