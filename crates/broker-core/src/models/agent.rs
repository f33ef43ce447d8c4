// ABOUTME: Agent profiles: a named {provider, model, auth reference} binding owned by one user
// ABOUTME: The auth reference is a credential XOR a provider grant, enforced by construction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Provider;
use crate::clock::{Clock, IdGenerator};
use crate::errors::{DomainError, DomainResult};
use crate::validation::{bounded, optional, required, MAX_NAME_LEN};

/// Agent status. Only `active` exists today; deletion removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Invocable
    Active,
}

impl AgentStatus {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            other => Err(DomainError::Unsupported {
                field: "agent status",
                value: other.to_owned(),
            }),
        }
    }
}

/// The single secret source an agent invokes with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReference {
    /// Static credential id
    Credential(String),
    /// OAuth provider grant id
    ProviderGrant(String),
}

impl AuthReference {
    /// Build from the two nullable columns/fields; exactly one must be non-blank
    pub fn from_parts(
        credential_id: Option<&str>,
        provider_grant_id: Option<&str>,
    ) -> DomainResult<Self> {
        match (optional(credential_id), optional(provider_grant_id)) {
            (Some(id), None) => Ok(Self::Credential(id)),
            (None, Some(id)) => Ok(Self::ProviderGrant(id)),
            (Some(_), Some(_)) => Err(DomainError::invalid(
                "exactly one of credential_id or provider_grant_id must be set, not both",
            )),
            (None, None) => Err(DomainError::invalid(
                "exactly one of credential_id or provider_grant_id must be set",
            )),
        }
    }

    /// Credential id when bound to a credential
    #[must_use]
    pub fn credential_id(&self) -> Option<&str> {
        match self {
            Self::Credential(id) => Some(id),
            Self::ProviderGrant(_) => None,
        }
    }

    /// Provider grant id when bound to a grant
    #[must_use]
    pub fn provider_grant_id(&self) -> Option<&str> {
        match self {
            Self::ProviderGrant(id) => Some(id),
            Self::Credential(_) => None,
        }
    }
}

/// Stored agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Record id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Display name
    pub name: String,
    /// Provider dispatched to
    pub provider: Provider,
    /// Provider model name
    pub model: String,
    /// Secret source
    pub auth: AuthReference,
    /// Status
    pub status: AgentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// How the viewer reaches an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAccess {
    /// Viewer owns the agent
    Owner,
    /// Viewer holds an approved invoke access request
    Shared,
}

/// Agent as returned to callers. Shared viewers never see auth reference ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    /// Record id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Display name
    pub name: String,
    /// Provider
    pub provider: Provider,
    /// Model
    pub model: String,
    /// Bound credential (owner view only)
    pub credential_id: Option<String>,
    /// Bound provider grant (owner view only)
    pub provider_grant_id: Option<String>,
    /// Status
    pub status: AgentStatus,
    /// Viewer relationship
    pub access: AgentAccess,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Projection for the given relationship
    #[must_use]
    pub fn view(&self, access: AgentAccess) -> AgentView {
        let (credential_id, provider_grant_id) = match access {
            AgentAccess::Owner => (
                self.auth.credential_id().map(str::to_owned),
                self.auth.provider_grant_id().map(str::to_owned),
            ),
            AgentAccess::Shared => (None, None),
        };
        AgentView {
            id: self.id.clone(),
            owner_user_id: self.owner_user_id.clone(),
            name: self.name.clone(),
            provider: self.provider,
            model: self.model.clone(),
            credential_id,
            provider_grant_id,
            status: self.status,
            access,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Apply validated changes, replacing the auth reference wholesale when one is supplied
    #[must_use]
    pub fn apply(&self, changes: AgentChanges, now: DateTime<Utc>) -> Self {
        Self {
            name: changes.name.unwrap_or_else(|| self.name.clone()),
            model: changes.model.unwrap_or_else(|| self.model.clone()),
            auth: changes.auth.unwrap_or_else(|| self.auth.clone()),
            updated_at: now,
            ..self.clone()
        }
    }
}

/// Raw create request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAgentInput {
    /// Owning user (taken from the trusted caller identity)
    #[serde(default)]
    pub owner_user_id: String,
    /// Display name
    pub name: String,
    /// Provider name
    pub provider: String,
    /// Model name
    pub model: String,
    /// Credential binding
    #[serde(default)]
    pub credential_id: Option<String>,
    /// Provider grant binding
    #[serde(default)]
    pub provider_grant_id: Option<String>,
}

/// Validated create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAgent {
    /// Owning user
    pub owner_user_id: String,
    /// Display name
    pub name: String,
    /// Provider
    pub provider: Provider,
    /// Model
    pub model: String,
    /// Secret source
    pub auth: AuthReference,
}

impl NewAgent {
    /// Validate and normalise a create request
    pub fn normalize(input: CreateAgentInput) -> DomainResult<Self> {
        let owner_user_id = required("owner_user_id", &input.owner_user_id)?;
        let name = bounded("name", required("name", &input.name)?, MAX_NAME_LEN)?;
        let provider: Provider = input.provider.parse()?;
        let model = bounded("model", required("model", &input.model)?, MAX_NAME_LEN)?;
        let auth = AuthReference::from_parts(
            input.credential_id.as_deref(),
            input.provider_grant_id.as_deref(),
        )?;
        Ok(Self {
            owner_user_id,
            name,
            provider,
            model,
            auth,
        })
    }

    /// Build the active record
    #[must_use]
    pub fn create(self, clock: &dyn Clock, ids: &dyn IdGenerator) -> Agent {
        let now = clock.now();
        Agent {
            id: ids.next_id(),
            owner_user_id: self.owner_user_id,
            name: self.name,
            provider: self.provider,
            model: self.model,
            auth: self.auth,
            status: AgentStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw update request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAgentInput {
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New model
    #[serde(default)]
    pub model: Option<String>,
    /// Switch binding to this credential
    #[serde(default)]
    pub credential_id: Option<String>,
    /// Switch binding to this provider grant
    #[serde(default)]
    pub provider_grant_id: Option<String>,
}

/// Validated update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentChanges {
    /// New display name
    pub name: Option<String>,
    /// New model
    pub model: Option<String>,
    /// Replacement auth reference
    pub auth: Option<AuthReference>,
}

impl AgentChanges {
    /// Validate an update request. Supplying either auth field switches the binding.
    pub fn normalize(input: &UpdateAgentInput) -> DomainResult<Self> {
        let name = match input.name.as_deref() {
            Some(name) => Some(bounded("name", required("name", name)?, MAX_NAME_LEN)?),
            None => None,
        };
        let model = match input.model.as_deref() {
            Some(model) => Some(bounded("model", required("model", model)?, MAX_NAME_LEN)?),
            None => None,
        };
        let credential_id = optional(input.credential_id.as_deref());
        let provider_grant_id = optional(input.provider_grant_id.as_deref());
        let auth = if credential_id.is_some() || provider_grant_id.is_some() {
            Some(AuthReference::from_parts(
                credential_id.as_deref(),
                provider_grant_id.as_deref(),
            )?)
        } else {
            None
        };

        if name.is_none() && model.is_none() && auth.is_none() {
            return Err(DomainError::invalid(
                "update must change at least one of name, model, credential_id, provider_grant_id",
            ));
        }

        Ok(Self { name, model, auth })
    }
}
