// ABOUTME: Access request workflow: requesters ask, owners approve, deny or revoke
// ABOUTME: Transitions are compare-and-swap on the prior status; foreign requests look absent
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use broker_core::models::{
    AccessRequest, AccessRequestRole, AccessRequestStatus, AgentStatus, AuditEventName,
    CreateAccessRequestInput, NewAccessRequest, ReviewDecision,
};
use broker_core::validation::required;
use serde::Deserialize;
use tracing::{info, instrument};

use super::agents::AGENT_NOT_FOUND;
use super::{mask_not_found, BrokerService};
use crate::errors::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};

const REQUEST_NOT_FOUND: &str = "access request not found";

/// Owner's review decision
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewAccessRequestInput {
    /// `approve` or `deny`
    #[serde(default)]
    pub decision: String,
    /// Optional note shown to the requester
    #[serde(default)]
    pub note: Option<String>,
}

impl BrokerService {
    /// `CreateAccessRequest`: the caller asks the owner for invoke access to one agent
    ///
    /// # Errors
    ///
    /// Returns a validation error when the caller owns the agent or the scope is unsupported,
    /// and not-found unless the agent is active and owned by the named owner
    #[instrument(skip(self, caller, input), fields(requester_user_id = %caller))]
    pub async fn create_access_request(
        &self,
        caller: &str,
        mut input: CreateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        input.requester_user_id = caller.to_owned();
        let new = NewAccessRequest::normalize(input)?;

        let agent = self
            .stores
            .agents
            .get(&new.agent_id)
            .await
            .map_err(|e| mask_not_found(e, AGENT_NOT_FOUND))?;
        if agent.owner_user_id != new.owner_user_id || agent.status != AgentStatus::Active {
            return Err(AppError::not_found(AGENT_NOT_FOUND));
        }

        let request = new.create(self.clock.as_ref(), self.ids.as_ref());
        self.stores.access_requests.insert(&request).await?;
        info!(
            access_request_id = %request.id,
            owner_user_id = %request.owner_user_id,
            agent_id = %request.agent_id,
            "Access request created"
        );

        self.audit
            .record(
                self.audit
                    .event(
                        AuditEventName::AccessRequestCreated,
                        caller,
                        &request.owner_user_id,
                    )
                    .with_requester(&request.requester_user_id)
                    .with_agent(&request.agent_id)
                    .with_access_request(&request.id),
            )
            .await?;
        Ok(request)
    }

    /// `ListAccessRequests`: requests where the caller is requester or owner
    ///
    /// # Errors
    ///
    /// Returns a database error if the listing fails
    pub async fn list_access_requests(
        &self,
        caller: &str,
        role: AccessRequestRole,
        page: &PageRequest,
    ) -> AppResult<Page<AccessRequest>> {
        Ok(self
            .stores
            .access_requests
            .list(caller, role, page)
            .await?)
    }

    /// Load a request the caller owns; anything else is reported as absent
    async fn owned_request(&self, caller: &str, request_id: &str) -> AppResult<AccessRequest> {
        let request_id = required("access_request_id", request_id)?;
        let request = self
            .stores
            .access_requests
            .get(&request_id)
            .await
            .map_err(|e| mask_not_found(e, REQUEST_NOT_FOUND))?;
        if request.owner_user_id != caller {
            return Err(AppError::not_found(REQUEST_NOT_FOUND));
        }
        Ok(request)
    }

    /// `ReviewAccessRequest`: `pending -> approved | denied`, owner only
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign requests and failed-precondition unless the
    /// request is still pending
    #[instrument(skip(self, caller, input), fields(owner_user_id = %caller))]
    pub async fn review_access_request(
        &self,
        caller: &str,
        request_id: &str,
        input: ReviewAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        let decision: ReviewDecision = input.decision.parse()?;
        let request = self.owned_request(caller, request_id).await?;

        let reviewed =
            request.reviewed(caller, decision, input.note.as_deref(), self.clock.now())?;
        self.stores
            .access_requests
            .transition(&reviewed, AccessRequestStatus::Pending)
            .await
            .map_err(|e| AppError::from(e).conflict_as_precondition())?;
        info!(
            access_request_id = %reviewed.id,
            status = %reviewed.status,
            "Access request reviewed"
        );

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::AccessRequestReviewed, caller, caller)
                    .with_requester(&reviewed.requester_user_id)
                    .with_agent(&reviewed.agent_id)
                    .with_access_request(&reviewed.id),
            )
            .await?;
        Ok(reviewed)
    }

    /// `RevokeAccessRequest`: `approved -> revoked`, owner only. Invocation stops honouring
    /// the approval as soon as this returns.
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign requests and failed-precondition unless the
    /// request is currently approved
    #[instrument(skip(self, caller, note), fields(owner_user_id = %caller))]
    pub async fn revoke_access_request(
        &self,
        caller: &str,
        request_id: &str,
        note: Option<&str>,
    ) -> AppResult<AccessRequest> {
        let request = self.owned_request(caller, request_id).await?;

        let revoked = request.revoked(note, self.clock.now())?;
        self.stores
            .access_requests
            .transition(&revoked, AccessRequestStatus::Approved)
            .await
            .map_err(|e| AppError::from(e).conflict_as_precondition())?;
        info!(access_request_id = %revoked.id, "Access request revoked");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::AccessRequestRevoked, caller, caller)
                    .with_requester(&revoked.requester_user_id)
                    .with_agent(&revoked.agent_id)
                    .with_access_request(&revoked.id),
            )
            .await?;
        Ok(revoked)
    }
}
