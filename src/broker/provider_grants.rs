// ABOUTME: Provider grant lifecycle: PKCE connect handshake, refresh state machine and revoke
// ABOUTME: Refresh failures are recorded on the grant and never overwrite the last good tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;

use broker_core::models::{
    AuditEventName, AuditOutcome, GrantDisposition, NewConnectSession, Provider, ProviderGrant,
    ProviderGrantStatus, ProviderGrantSummary, StartConnectInput, TokenPayload,
};
use broker_core::validation::{optional, required};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use super::{mask_not_found, BrokerService};
use crate::crypto::{generate_state, hash_state, state_matches, PkceChallenge};
use crate::database::{DatabaseError, ProviderGrantFilter, RefreshedTokens};
use crate::errors::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};
use crate::providers::{AuthorizationRequest, ProviderTokens};

const RESOURCE: &str = "provider_grant";
const GRANT_NOT_FOUND: &str = "provider grant not found";
const SESSION_NOT_FOUND: &str = "connect session not found";

/// Result of starting a connect handshake. `state` must round-trip through the redirect.
#[derive(Clone, Serialize)]
pub struct ConnectStarted {
    /// Session to finish
    pub session_id: String,
    /// CSRF state; only its hash is stored
    pub state: String,
    /// Where to send the user
    pub authorization_url: String,
    /// Deadline for finishing
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for ConnectStarted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectStarted")
            .field("session_id", &self.session_id)
            .field("state", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Values returned on the OAuth redirect
#[derive(Clone, Default, Deserialize)]
pub struct FinishConnectInput {
    /// CSRF state from the redirect
    #[serde(default)]
    pub state: String,
    /// Authorization code from the redirect
    #[serde(default)]
    pub code: String,
}

impl fmt::Debug for FinishConnectInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinishConnectInput")
            .field("state", &"[REDACTED]")
            .field("code", &"[REDACTED]")
            .finish()
    }
}

/// Raw grant listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListProviderGrantsInput {
    /// Provider name
    #[serde(default)]
    pub provider: Option<String>,
    /// Status name
    #[serde(default)]
    pub status: Option<String>,
}

impl ListProviderGrantsInput {
    /// Parse into a store filter
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown providers or statuses
    pub fn into_filter(self) -> AppResult<ProviderGrantFilter> {
        Ok(ProviderGrantFilter {
            provider: optional(self.provider.as_deref())
                .map(|p| p.parse::<Provider>())
                .transpose()?,
            status: optional(self.status.as_deref())
                .map(|s| s.parse::<ProviderGrantStatus>())
                .transpose()?,
        })
    }
}

fn expiry_from(tokens: &ProviderTokens, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    tokens
        .expires_in
        .filter(|seconds| *seconds > 0)
        .map(|seconds| now + Duration::seconds(seconds))
}

fn serialize_payload(payload: &TokenPayload) -> AppResult<Zeroizing<String>> {
    payload
        .to_json()
        .map(Zeroizing::new)
        .map_err(|e| AppError::internal(e.to_string()))
}

impl BrokerService {
    /// `StartProviderConnect`: persist a pending PKCE session and build the authorization URL
    ///
    /// # Errors
    ///
    /// Returns failed-precondition when the provider has no OAuth adapter
    #[instrument(skip(self, caller, input), fields(owner_user_id = %caller))]
    pub async fn start_provider_connect(
        &self,
        caller: &str,
        mut input: StartConnectInput,
    ) -> AppResult<ConnectStarted> {
        input.owner_user_id = caller.to_owned();
        let new = NewConnectSession::normalize(input)?;
        let oauth = self.adapters.oauth(new.provider)?;

        let pkce = PkceChallenge::generate();
        let state = generate_state();
        let verifier_ciphertext = self.sealer.seal(&pkce.code_verifier)?;
        let session = new.create(
            hash_state(&state),
            verifier_ciphertext,
            self.clock.as_ref(),
            self.ids.as_ref(),
        );

        let authorization_url = oauth.authorization_url(AuthorizationRequest {
            state: &state,
            code_challenge: &pkce.code_challenge,
            scopes: &session.requested_scopes,
        })?;

        self.stores.connect_sessions.insert(&session).await?;
        info!(session_id = %session.id, provider = %session.provider, "Connect session started");

        Ok(ConnectStarted {
            session_id: session.id,
            state,
            authorization_url,
            expires_at: session.expires_at,
        })
    }

    /// `FinishProviderConnect`: verify the session, exchange the code and create the grant.
    /// Checks that fail leave the session untouched so a legitimate retry can still succeed.
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign sessions, failed-precondition for expired,
    /// completed or state-mismatched sessions, and an upstream error if the exchange fails
    #[instrument(skip(self, caller, input), fields(owner_user_id = %caller))]
    pub async fn finish_provider_connect(
        &self,
        caller: &str,
        session_id: &str,
        input: FinishConnectInput,
    ) -> AppResult<ProviderGrantSummary> {
        let session_id = required("session_id", session_id)?;
        let state = required("state", &input.state)?;
        let code = Zeroizing::new(required("code", &input.code)?);

        let session = self
            .stores
            .connect_sessions
            .get(caller, &session_id)
            .await
            .map_err(|e| mask_not_found(e, SESSION_NOT_FOUND))?;
        let now = self.clock.now();
        session.ensure_finishable(now)?;
        if !state_matches(&state, &session.state_hash) {
            warn!(session_id = %session.id, "Connect state mismatch");
            return Err(AppError::failed_precondition("connect state mismatch"));
        }

        let oauth = self.adapters.oauth(session.provider)?;
        let verifier = self.sealer.open(&session.code_verifier_ciphertext)?;
        let tokens = oauth.exchange_code(&code, &verifier).await?;

        let payload = TokenPayload {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone().unwrap_or_default(),
        };
        let token_ciphertext = self.sealer.seal(&serialize_payload(&payload)?)?;

        let grant = ProviderGrant::from_connect(
            &session,
            token_ciphertext,
            tokens.scopes.clone(),
            !payload.refresh_token.is_empty(),
            expiry_from(&tokens, now),
            self.clock.as_ref(),
            self.ids.as_ref(),
        );
        // A concurrent finisher loses here and no second grant is written
        self.stores
            .connect_sessions
            .complete(caller, &session.id, &grant, now)
            .await
            .map_err(|e| AppError::from(e).conflict_as_precondition())?;
        info!(grant_id = %grant.id, provider = %grant.provider, "Provider grant created");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::ProviderGrantCreated, caller, caller)
                    .with_resource(RESOURCE, &grant.id),
            )
            .await?;
        Ok(grant.summary())
    }

    /// `ListProviderGrants`, owner-scoped
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown filter values
    pub async fn list_provider_grants(
        &self,
        caller: &str,
        input: ListProviderGrantsInput,
        page: &PageRequest,
    ) -> AppResult<Page<ProviderGrantSummary>> {
        let filter = input.into_filter()?;
        let grants = self
            .stores
            .provider_grants
            .list(caller, filter, page)
            .await?;
        Ok(grants.map(|grant| grant.summary()))
    }

    /// `RefreshProviderGrant`: explicit refresh, audited with its outcome
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign grants and failed-precondition when the grant is
    /// revoked, cannot refresh, or the refresh fails
    #[instrument(skip(self, caller), fields(owner_user_id = %caller))]
    pub async fn refresh_provider_grant(
        &self,
        caller: &str,
        grant_id: &str,
    ) -> AppResult<ProviderGrantSummary> {
        let grant_id = required("grant_id", grant_id)?;
        let grant = self
            .stores
            .provider_grants
            .get(caller, &grant_id)
            .await
            .map_err(|e| mask_not_found(e, GRANT_NOT_FOUND))?;
        if grant.status == ProviderGrantStatus::Revoked {
            return Err(AppError::failed_precondition("provider grant is revoked"));
        }
        if !grant.refresh_supported {
            return Err(AppError::failed_precondition(
                "provider grant does not support refresh",
            ));
        }

        let result = self.refresh_grant(&grant).await;
        let outcome = if result.is_ok() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.audit
            .record(
                self.audit
                    .event(AuditEventName::ProviderGrantRefreshed, caller, caller)
                    .with_resource(RESOURCE, &grant.id)
                    .with_outcome(outcome),
            )
            .await?;

        result.map(|(refreshed, _)| refreshed.summary())
    }

    /// Refresh `grant` and persist the outcome. Returns the updated grant and its new access
    /// token. Adapter failures mark the grant `refresh_failed` and surface as failed-precondition.
    /// When another caller refreshed the same grant first, its result is used instead.
    pub(crate) async fn refresh_grant(
        &self,
        grant: &ProviderGrant,
    ) -> AppResult<(ProviderGrant, Zeroizing<String>)> {
        let oauth = self.adapters.oauth(grant.provider)?;
        let current = self.open_payload(grant)?;

        let refreshed = if current.refresh_token.is_empty() {
            Err("no refresh token held".to_owned())
        } else {
            oauth
                .refresh(&current.refresh_token)
                .await
                .map_err(|e| e.to_string())
                .and_then(|tokens| {
                    if tokens.access_token.trim().is_empty() {
                        Err("provider returned an empty access token".to_owned())
                    } else {
                        Ok(tokens)
                    }
                })
        };

        let now = self.clock.now();
        let tokens = match refreshed {
            Ok(tokens) => tokens,
            Err(message) => {
                warn!(grant_id = %grant.id, provider = %grant.provider, error = %message, "Provider grant refresh failed");
                let status = grant.status.after_refresh(false)?;
                return match self
                    .stores
                    .provider_grants
                    .record_refresh_failure(grant, status, &message, now)
                    .await
                {
                    Ok(_) => Err(AppError::failed_precondition("provider grant refresh failed")),
                    Err(DatabaseError::Conflict { .. }) => {
                        self.adopt_concurrent_refresh(grant).await
                    }
                    Err(e) => Err(AppError::from(e)),
                };
            }
        };

        // Providers that rotate nothing keep the refresh token already held
        let payload = TokenPayload {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens
                .refresh_token
                .clone()
                .unwrap_or_else(|| current.refresh_token.clone()),
        };
        let token_ciphertext = self.sealer.seal(&serialize_payload(&payload)?)?;
        let status = grant.status.after_refresh(true)?;
        let updated = match self
            .stores
            .provider_grants
            .record_refresh_success(
                grant,
                status,
                RefreshedTokens {
                    token_ciphertext,
                    refresh_supported: !payload.refresh_token.is_empty(),
                    expires_at: expiry_from(&tokens, now),
                },
                now,
            )
            .await
        {
            Ok(updated) => updated,
            Err(DatabaseError::Conflict { .. }) => {
                return self.adopt_concurrent_refresh(grant).await;
            }
            Err(e) => return Err(AppError::from(e)),
        };
        info!(grant_id = %updated.id, provider = %updated.provider, "Provider grant refreshed");

        Ok((updated, Zeroizing::new(payload.access_token)))
    }

    /// The grant changed after `read` was loaded. Use the stored tokens if a concurrent
    /// refresh left the grant active; anything else is a failed refresh.
    async fn adopt_concurrent_refresh(
        &self,
        read: &ProviderGrant,
    ) -> AppResult<(ProviderGrant, Zeroizing<String>)> {
        let latest = self
            .stores
            .provider_grants
            .get(&read.owner_user_id, &read.id)
            .await
            .map_err(|e| mask_not_found(e, GRANT_NOT_FOUND))?;
        match latest.status {
            ProviderGrantStatus::Active if latest.token_ciphertext != read.token_ciphertext => {
                let payload = self.open_payload(&latest)?;
                if payload.access_token.is_empty() {
                    return Err(AppError::failed_precondition("provider grant unavailable"));
                }
                debug!(grant_id = %latest.id, "Using tokens from a concurrent refresh");
                let access_token = Zeroizing::new(payload.access_token.clone());
                Ok((latest, access_token))
            }
            ProviderGrantStatus::Revoked => {
                Err(AppError::failed_precondition("provider grant is revoked"))
            }
            ProviderGrantStatus::Active
            | ProviderGrantStatus::Expired
            | ProviderGrantStatus::RefreshFailed => {
                Err(AppError::failed_precondition("provider grant refresh failed"))
            }
        }
    }

    fn open_payload(&self, grant: &ProviderGrant) -> AppResult<TokenPayload> {
        TokenPayload::from_json(&self.sealer.open(&grant.token_ciphertext)?)
            .map_err(|e| AppError::internal(e.to_string()))
    }

    /// `RevokeProviderGrant`: local revoke, then a best-effort revoke at the provider
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign grants, failed-precondition when already revoked
    /// and conflict when a concurrent revoke wins
    #[instrument(skip(self, caller), fields(owner_user_id = %caller))]
    pub async fn revoke_provider_grant(
        &self,
        caller: &str,
        grant_id: &str,
    ) -> AppResult<ProviderGrantSummary> {
        let grant_id = required("grant_id", grant_id)?;
        let grant = self
            .stores
            .provider_grants
            .get(caller, &grant_id)
            .await
            .map_err(|e| mask_not_found(e, GRANT_NOT_FOUND))?;
        grant.status.revoke()?;

        let revoked = self
            .stores
            .provider_grants
            .revoke(caller, &grant.id, self.clock.now())
            .await?;
        info!(grant_id = %revoked.id, "Provider grant revoked");

        self.revoke_at_provider(&grant).await;

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::ProviderGrantRevoked, caller, caller)
                    .with_resource(RESOURCE, &revoked.id),
            )
            .await?;
        Ok(revoked.summary())
    }

    /// Failures are logged and otherwise ignored
    async fn revoke_at_provider(&self, grant: &ProviderGrant) {
        let Ok(oauth) = self.adapters.oauth(grant.provider) else {
            return;
        };
        let payload = match self
            .sealer
            .open(&grant.token_ciphertext)
            .and_then(|json| {
                TokenPayload::from_json(&json).map_err(|e| AppError::internal(e.to_string()))
            }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(grant_id = %grant.id, error = %e, "Cannot open grant tokens for remote revoke");
                return;
            }
        };
        let token = if payload.refresh_token.is_empty() {
            &payload.access_token
        } else {
            &payload.refresh_token
        };
        if let Err(e) = oauth.revoke(token).await {
            warn!(grant_id = %grant.id, provider = %grant.provider, error = %e, "Remote token revoke failed");
        }
    }

    /// Resolve the access token a grant-backed agent should use right now, refreshing first
    /// when the grant is inside the pre-expiry window or recovering from a failed refresh.
    /// Owner or provider mismatch is reported as not-found.
    pub(crate) async fn resolve_provider_grant_for_invocation(
        &self,
        owner_user_id: &str,
        grant_id: &str,
        provider: Option<Provider>,
    ) -> AppResult<Zeroizing<String>> {
        let grant = self
            .stores
            .provider_grants
            .get(owner_user_id, grant_id)
            .await
            .map_err(|e| mask_not_found(e, GRANT_NOT_FOUND))?;
        if !grant.belongs_to(owner_user_id, provider) {
            return Err(AppError::not_found(GRANT_NOT_FOUND));
        }

        match grant.disposition(self.clock.now()) {
            GrantDisposition::Usable => {
                let payload = self.open_payload(&grant)?;
                if payload.access_token.is_empty() {
                    return Err(AppError::failed_precondition("provider grant unavailable"));
                }
                Ok(Zeroizing::new(payload.access_token.clone()))
            }
            GrantDisposition::RefreshBeforeUse | GrantDisposition::RecoverByRefresh => {
                let (_, access_token) = self.refresh_grant(&grant).await?;
                Ok(access_token)
            }
            GrantDisposition::Unavailable => {
                Err(AppError::failed_precondition("provider grant unavailable"))
            }
        }
    }
}
