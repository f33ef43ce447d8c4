// ABOUTME: OAuth provider grants, PKCE connect sessions and the sealed token payload shape
// ABOUTME: Encodes the refresh/expiry state machine used when a grant backs an invocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Provider;
use crate::clock::{Clock, IdGenerator};
use crate::errors::{DomainError, DomainResult};
use crate::validation::{normalize_scopes, required};

/// Lifetime of a pending connect session
pub const CONNECT_SESSION_TTL_MINUTES: i64 = 10;

/// Grants expiring within this window are refreshed before use
pub const REFRESH_WINDOW_SECONDS: i64 = 120;

/// Provider grant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderGrantStatus {
    /// Tokens are believed valid
    Active,
    /// Withdrawn by the owner; terminal
    Revoked,
    /// Tokens lapsed. Set outside the broker; the broker only recovers it by refresh.
    Expired,
    /// Last refresh attempt failed; last-known-good tokens are kept
    RefreshFailed,
}

impl ProviderGrantStatus {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::RefreshFailed => "refresh_failed",
        }
    }

    /// Transition to `revoked` from any non-terminal state
    pub fn revoke(self) -> DomainResult<Self> {
        match self {
            Self::Revoked => Err(DomainError::InvalidTransition {
                entity: "provider grant",
                from: self.as_str().to_owned(),
                action: "revoked",
            }),
            Self::Active | Self::Expired | Self::RefreshFailed => Ok(Self::Revoked),
        }
    }

    /// Outcome of a refresh attempt; revoked grants never come back
    pub fn after_refresh(self, succeeded: bool) -> DomainResult<Self> {
        match self {
            Self::Revoked => Err(DomainError::InvalidTransition {
                entity: "provider grant",
                from: self.as_str().to_owned(),
                action: "refreshed",
            }),
            Self::Active | Self::Expired | Self::RefreshFailed => Ok(if succeeded {
                Self::Active
            } else {
                Self::RefreshFailed
            }),
        }
    }
}

impl fmt::Display for ProviderGrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderGrantStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            "refresh_failed" => Ok(Self::RefreshFailed),
            other => Err(DomainError::Unsupported {
                field: "provider grant status",
                value: other.to_owned(),
            }),
        }
    }
}

/// What invocation must do with a grant before its token can be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantDisposition {
    /// Use the stored access token as-is
    Usable,
    /// Active but inside the pre-expiry window: refresh, then use
    RefreshBeforeUse,
    /// Expired or previously failed, refresh supported: refresh to recover
    RecoverByRefresh,
    /// Cannot back an invocation
    Unavailable,
}

/// Stored provider grant. Tokens are held only as sealed ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderGrant {
    /// Record id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Provider
    pub provider: Provider,
    /// Scopes the provider granted
    pub granted_scopes: Vec<String>,
    /// Sealed JSON [`TokenPayload`]
    pub token_ciphertext: String,
    /// Whether a refresh token was issued
    pub refresh_supported: bool,
    /// Lifecycle status
    pub status: ProviderGrantStatus,
    /// Message from the last failed refresh, empty otherwise
    pub last_refresh_error: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Revocation time
    pub revoked_at: Option<DateTime<Utc>>,
    /// Access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Last successful refresh
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl ProviderGrant {
    /// Build the active grant produced by a completed connect handshake
    #[must_use]
    pub fn from_connect(
        session: &ProviderConnectSession,
        token_ciphertext: String,
        granted_scopes: Vec<String>,
        refresh_supported: bool,
        expires_at: Option<DateTime<Utc>>,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Self {
        let now = clock.now();
        let granted_scopes = if granted_scopes.is_empty() {
            session.requested_scopes.clone()
        } else {
            normalize_scopes(&granted_scopes)
        };
        Self {
            id: ids.next_id(),
            owner_user_id: session.owner_user_id.clone(),
            provider: session.provider,
            granted_scopes,
            token_ciphertext,
            refresh_supported,
            status: ProviderGrantStatus::Active,
            last_refresh_error: String::new(),
            created_at: now,
            updated_at: now,
            revoked_at: None,
            expires_at,
            last_refreshed_at: None,
        }
    }

    /// Whether `owner` (and `provider`, when given) match this record exactly
    #[must_use]
    pub fn belongs_to(&self, owner_user_id: &str, provider: Option<Provider>) -> bool {
        self.owner_user_id == owner_user_id && provider.is_none_or(|p| p == self.provider)
    }

    /// Classify the grant for invocation at `now`
    #[must_use]
    pub fn disposition(&self, now: DateTime<Utc>) -> GrantDisposition {
        match self.status {
            ProviderGrantStatus::Active => match self.expires_at {
                Some(expires_at)
                    if self.refresh_supported
                        && expires_at - now <= Duration::seconds(REFRESH_WINDOW_SECONDS) =>
                {
                    GrantDisposition::RefreshBeforeUse
                }
                _ => GrantDisposition::Usable,
            },
            ProviderGrantStatus::RefreshFailed | ProviderGrantStatus::Expired
                if self.refresh_supported =>
            {
                GrantDisposition::RecoverByRefresh
            }
            _ => GrantDisposition::Unavailable,
        }
    }

    /// Public projection without ciphertext
    #[must_use]
    pub fn summary(&self) -> ProviderGrantSummary {
        ProviderGrantSummary {
            id: self.id.clone(),
            owner_user_id: self.owner_user_id.clone(),
            provider: self.provider,
            granted_scopes: self.granted_scopes.clone(),
            refresh_supported: self.refresh_supported,
            status: self.status,
            last_refresh_error: self.last_refresh_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            revoked_at: self.revoked_at,
            expires_at: self.expires_at,
            last_refreshed_at: self.last_refreshed_at,
        }
    }
}

/// Provider grant as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGrantSummary {
    /// Record id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Provider
    pub provider: Provider,
    /// Granted scopes
    pub granted_scopes: Vec<String>,
    /// Whether refresh is possible
    pub refresh_supported: bool,
    /// Lifecycle status
    pub status: ProviderGrantStatus,
    /// Last refresh failure message
    pub last_refresh_error: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Revocation time
    pub revoked_at: Option<DateTime<Utc>>,
    /// Access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Last successful refresh
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

/// Plaintext of a grant's token ciphertext. Unknown fields are ignored.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Bearer token used for inference calls
    pub access_token: String,
    /// Token used to obtain a new access token; empty when not issued
    #[serde(default)]
    pub refresh_token: String,
}

impl fmt::Debug for TokenPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPayload")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

impl TokenPayload {
    /// Parse the unsealed JSON payload
    pub fn from_json(json: &str) -> DomainResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DomainError::invalid(format!("malformed token payload: {e}")))
    }

    /// Serialise for sealing
    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::invalid(format!("unserialisable token payload: {e}")))
    }
}

/// Connect session status; `pending -> completed` only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectSessionStatus {
    /// Awaiting the authorization code
    Pending,
    /// Consumed
    Completed,
}

impl ConnectSessionStatus {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for ConnectSessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::Unsupported {
                field: "connect session status",
                value: other.to_owned(),
            }),
        }
    }
}

/// Ephemeral PKCE handshake state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConnectSession {
    /// Session id
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Provider being connected
    pub provider: Provider,
    /// Status
    pub status: ConnectSessionStatus,
    /// Scopes asked for
    pub requested_scopes: Vec<String>,
    /// SHA-256 of the CSRF state; the state itself is never stored
    pub state_hash: String,
    /// Sealed PKCE code verifier
    pub code_verifier_ciphertext: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
    /// Hard deadline for finishing
    pub expires_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProviderConnectSession {
    /// Check the session can be finished at `now`. Does not inspect state or owner.
    pub fn ensure_finishable(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != ConnectSessionStatus::Pending {
            return Err(DomainError::InvalidTransition {
                entity: "connect session",
                from: self.status.as_str().to_owned(),
                action: "completed",
            });
        }
        if now >= self.expires_at {
            return Err(DomainError::InvalidTransition {
                entity: "connect session",
                from: "expired".to_owned(),
                action: "completed",
            });
        }
        Ok(())
    }
}

/// Raw connect start request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartConnectInput {
    /// Owning user (taken from the trusted caller identity)
    #[serde(default)]
    pub owner_user_id: String,
    /// Provider name
    pub provider: String,
    /// Requested scopes
    #[serde(default)]
    pub requested_scopes: Vec<String>,
}

/// Validated connect start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnectSession {
    /// Owning user
    pub owner_user_id: String,
    /// Provider
    pub provider: Provider,
    /// Normalised scopes
    pub requested_scopes: Vec<String>,
}

impl NewConnectSession {
    /// Validate a connect start request
    pub fn normalize(input: StartConnectInput) -> DomainResult<Self> {
        Ok(Self {
            owner_user_id: required("owner_user_id", &input.owner_user_id)?,
            provider: input.provider.parse()?,
            requested_scopes: normalize_scopes(&input.requested_scopes),
        })
    }

    /// Build the pending session around the hashed state and sealed verifier
    #[must_use]
    pub fn create(
        self,
        state_hash: String,
        code_verifier_ciphertext: String,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> ProviderConnectSession {
        let now = clock.now();
        ProviderConnectSession {
            id: ids.next_id(),
            owner_user_id: self.owner_user_id,
            provider: self.provider,
            status: ConnectSessionStatus::Pending,
            requested_scopes: self.requested_scopes,
            state_hash,
            code_verifier_ciphertext,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::minutes(CONNECT_SESSION_TTL_MINUTES),
            completed_at: None,
        }
    }
}
