// ABOUTME: Static provider credential records (API keys) and their create/revoke lifecycle
// ABOUTME: Secret material only ever appears here as ciphertext or as redacted input
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Provider;
use crate::clock::{Clock, IdGenerator};
use crate::errors::{DomainError, DomainResult};
use crate::validation::{bounded, required, MAX_NAME_LEN};

/// Credential lifecycle status; `active -> revoked` is the only transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Usable for invocation
    Active,
    /// Permanently withdrawn
    Revoked,
}

impl CredentialStatus {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    /// Transition to `revoked`
    pub fn revoke(self) -> DomainResult<Self> {
        match self {
            Self::Active => Ok(Self::Revoked),
            Self::Revoked => Err(DomainError::InvalidTransition {
                entity: "credential",
                from: self.as_str().to_owned(),
                action: "revoked",
            }),
        }
    }
}

impl FromStr for CredentialStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(DomainError::Unsupported {
                field: "credential status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Stored credential. The secret is held only as sealed ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Record id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Provider the secret belongs to
    pub provider: Provider,
    /// Human label
    pub label: String,
    /// Sealed secret
    pub secret_ciphertext: String,
    /// Lifecycle status
    pub status: CredentialStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Revocation time
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether this credential may back an invocation for `owner` on `provider`
    #[must_use]
    pub fn is_usable_by(&self, owner_user_id: &str, provider: Provider) -> bool {
        self.status == CredentialStatus::Active
            && self.owner_user_id == owner_user_id
            && self.provider == provider
    }

    /// Public projection without ciphertext
    #[must_use]
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id.clone(),
            owner_user_id: self.owner_user_id.clone(),
            provider: self.provider,
            label: self.label.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            revoked_at: self.revoked_at,
        }
    }
}

/// Credential as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    /// Record id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Provider
    pub provider: Provider,
    /// Human label
    pub label: String,
    /// Lifecycle status
    pub status: CredentialStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Revocation time
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Raw create request as received from a caller
#[derive(Clone, Default, Deserialize)]
pub struct CreateCredentialInput {
    /// Owning user (taken from the trusted caller identity)
    #[serde(default)]
    pub owner_user_id: String,
    /// Provider name
    pub provider: String,
    /// Human label
    pub label: String,
    /// Plaintext secret
    pub secret: String,
}

impl fmt::Debug for CreateCredentialInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateCredentialInput")
            .field("owner_user_id", &self.owner_user_id)
            .field("provider", &self.provider)
            .field("label", &self.label)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Validated create request
#[derive(Clone)]
pub struct NewCredential {
    /// Owning user
    pub owner_user_id: String,
    /// Provider
    pub provider: Provider,
    /// Trimmed label
    pub label: String,
    /// Trimmed plaintext secret, to be sealed before persistence
    pub secret: String,
}

impl fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredential")
            .field("owner_user_id", &self.owner_user_id)
            .field("provider", &self.provider)
            .field("label", &self.label)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl NewCredential {
    /// Validate and normalise a create request
    pub fn normalize(input: CreateCredentialInput) -> DomainResult<Self> {
        let owner_user_id = required("owner_user_id", &input.owner_user_id)?;
        let provider: Provider = input.provider.parse()?;
        let label = bounded("label", required("label", &input.label)?, MAX_NAME_LEN)?;
        let secret = required("secret", &input.secret)?;
        Ok(Self {
            owner_user_id,
            provider,
            label,
            secret,
        })
    }

    /// Build the active record around an already sealed secret
    #[must_use]
    pub fn create(
        &self,
        secret_ciphertext: String,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Credential {
        let now = clock.now();
        Credential {
            id: ids.next_id(),
            owner_user_id: self.owner_user_id.clone(),
            provider: self.provider,
            label: self.label.clone(),
            secret_ciphertext,
            status: CredentialStatus::Active,
            created_at: now,
            updated_at: now,
            revoked_at: None,
        }
    }
}
