// ABOUTME: Agent registry: create, update, delete and list agents with validated auth references
// ABOUTME: Shared viewers reach agents only through approved invoke requests and never see auth ids
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::collections::HashSet;

use broker_core::models::{
    AgentAccess, AgentChanges, AgentView, AuditEventName, AuthReference, CreateAgentInput,
    NewAgent, Provider, ProviderGrantStatus, UpdateAgentInput,
};
use broker_core::validation::required;
use tracing::{debug, info, instrument};

use super::{mask_not_found, BrokerService};
use crate::errors::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};

/// Message used for every masked agent lookup
pub(crate) const AGENT_NOT_FOUND: &str = "agent not found";

impl BrokerService {
    /// The referenced credential or grant must exist, belong to `owner_user_id`, be active
    /// and serve `provider`
    async fn ensure_auth_reference(
        &self,
        owner_user_id: &str,
        provider: Provider,
        auth: &AuthReference,
    ) -> AppResult<()> {
        match auth {
            AuthReference::Credential(id) => {
                let credential = self
                    .stores
                    .credentials
                    .get(owner_user_id, id)
                    .await
                    .map_err(|e| mask_not_found(e, "credential not found"))?;
                if credential.provider != provider {
                    return Err(AppError::invalid_input(format!(
                        "credential provider {} does not match agent provider {provider}",
                        credential.provider
                    )));
                }
                if !credential.is_usable_by(owner_user_id, provider) {
                    return Err(AppError::failed_precondition("credential is not active"));
                }
            }
            AuthReference::ProviderGrant(id) => {
                let grant = self
                    .stores
                    .provider_grants
                    .get(owner_user_id, id)
                    .await
                    .map_err(|e| mask_not_found(e, "provider grant not found"))?;
                if grant.provider != provider {
                    return Err(AppError::invalid_input(format!(
                        "provider grant provider {} does not match agent provider {provider}",
                        grant.provider
                    )));
                }
                if grant.status != ProviderGrantStatus::Active {
                    return Err(AppError::failed_precondition(format!(
                        "provider grant is {}",
                        grant.status
                    )));
                }
            }
        }
        Ok(())
    }

    /// `CreateAgent`
    ///
    /// # Errors
    ///
    /// Returns a validation error unless exactly one usable auth reference is given
    #[instrument(skip(self, caller, input), fields(owner_user_id = %caller))]
    pub async fn create_agent(&self, caller: &str, mut input: CreateAgentInput) -> AppResult<AgentView> {
        input.owner_user_id = caller.to_owned();
        let new = NewAgent::normalize(input)?;
        self.ensure_auth_reference(&new.owner_user_id, new.provider, &new.auth)
            .await?;

        let agent = new.create(self.clock.as_ref(), self.ids.as_ref());
        self.stores.agents.insert(&agent).await?;
        info!(agent_id = %agent.id, provider = %agent.provider, "Agent created");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::AgentCreated, caller, caller)
                    .with_agent(&agent.id),
            )
            .await?;
        Ok(agent.view(AgentAccess::Owner))
    }

    /// `ListAgents`: agents the caller owns
    ///
    /// # Errors
    ///
    /// Returns a database error if the listing fails
    pub async fn list_agents(&self, caller: &str, page: &PageRequest) -> AppResult<Page<AgentView>> {
        let agents = self.stores.agents.list_owned(caller, page).await?;
        Ok(agents.map(|agent| agent.view(AgentAccess::Owner)))
    }

    /// `ListAccessibleAgents`: owned agents plus agents shared through approved invoke
    /// requests, merged in id order and paginated by last-seen id
    ///
    /// # Errors
    ///
    /// Returns a database error if a listing fails
    #[instrument(skip(self, caller, page), fields(user_id = %caller))]
    pub async fn list_accessible_agents(
        &self,
        caller: &str,
        page: &PageRequest,
    ) -> AppResult<Page<AgentView>> {
        let limit = page.limit() as usize;
        let cursor = page.cursor();

        let owned = self.stores.agents.list_owned(caller, page).await?;
        let more_owned = owned.next_page_token.is_some();

        let mut seen: HashSet<String> = owned.items.iter().map(|a| a.id.clone()).collect();
        let mut merged: Vec<AgentView> = owned
            .items
            .iter()
            .map(|agent| agent.view(AgentAccess::Owner))
            .collect();

        // Approvals arrive ordered by agent id; one past the page is enough to know more exist
        let approvals = self
            .stores
            .access_requests
            .list_approved_invoke_for_requester(caller)
            .await?;
        let mut shared_found = 0usize;
        for approval in approvals {
            if shared_found > limit {
                break;
            }
            if cursor.is_some_and(|after| approval.agent_id.as_str() <= after)
                || seen.contains(&approval.agent_id)
            {
                continue;
            }
            let agent = match self.stores.agents.get(&approval.agent_id).await {
                Ok(agent) => agent,
                Err(e) if e.is_not_found() => {
                    debug!(agent_id = %approval.agent_id, "Approved agent no longer exists");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if agent.owner_user_id != approval.owner_user_id || agent.owner_user_id == caller {
                continue;
            }
            seen.insert(agent.id.clone());
            merged.push(agent.view(AgentAccess::Shared));
            shared_found += 1;
        }

        merged.sort_by(|a, b| a.id.cmp(&b.id));
        let mut result = Page::from_rows(merged, page, |view| &view.id);
        if result.next_page_token.is_none() && more_owned {
            result.next_page_token = result.items.last().map(|view| view.id.clone());
        }
        Ok(result)
    }

    /// `GetAccessibleAgent`: an owned agent, or one shared with the caller
    ///
    /// # Errors
    ///
    /// Returns not-found when the agent is absent or not accessible to the caller
    pub async fn get_accessible_agent(&self, caller: &str, agent_id: &str) -> AppResult<AgentView> {
        let agent_id = required("agent_id", agent_id)?;
        let agent = self
            .stores
            .agents
            .get(&agent_id)
            .await
            .map_err(|e| mask_not_found(e, AGENT_NOT_FOUND))?;

        if agent.owner_user_id == caller {
            return Ok(agent.view(AgentAccess::Owner));
        }

        let approval = self
            .stores
            .access_requests
            .find_approved_invoke(caller, &agent.owner_user_id, &agent.id)
            .await?;
        match approval {
            Some(request) if request.authorizes_invoke(caller, &agent.owner_user_id, &agent.id) => {
                Ok(agent.view(AgentAccess::Shared))
            }
            _ => Err(AppError::not_found(AGENT_NOT_FOUND)),
        }
    }

    /// `UpdateAgent`: change name or model, or switch the auth reference wholesale
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign agents and a validation error for bad changes
    #[instrument(skip(self, caller, input), fields(owner_user_id = %caller))]
    pub async fn update_agent(
        &self,
        caller: &str,
        agent_id: &str,
        input: UpdateAgentInput,
    ) -> AppResult<AgentView> {
        let agent_id = required("agent_id", agent_id)?;
        let changes = AgentChanges::normalize(&input)?;

        let agent = self
            .stores
            .agents
            .get(&agent_id)
            .await
            .map_err(|e| mask_not_found(e, AGENT_NOT_FOUND))?;
        if agent.owner_user_id != caller {
            return Err(AppError::not_found(AGENT_NOT_FOUND));
        }
        if let Some(auth) = &changes.auth {
            self.ensure_auth_reference(caller, agent.provider, auth)
                .await?;
        }

        let updated = agent.apply(changes, self.clock.now());
        self.stores
            .agents
            .update(&updated)
            .await
            .map_err(|e| mask_not_found(e, AGENT_NOT_FOUND))?;
        info!(agent_id = %updated.id, "Agent updated");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::AgentUpdated, caller, caller)
                    .with_agent(&updated.id),
            )
            .await?;
        Ok(updated.view(AgentAccess::Owner))
    }

    /// `DeleteAgent`, owner-scoped
    ///
    /// # Errors
    ///
    /// Returns not-found if no owned agent matched
    #[instrument(skip(self, caller), fields(owner_user_id = %caller))]
    pub async fn delete_agent(&self, caller: &str, agent_id: &str) -> AppResult<()> {
        let agent_id = required("agent_id", agent_id)?;
        self.stores
            .agents
            .delete(caller, &agent_id)
            .await
            .map_err(|e| mask_not_found(e, AGENT_NOT_FOUND))?;
        info!(agent_id = %agent_id, "Agent deleted");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::AgentDeleted, caller, caller)
                    .with_agent(&agent_id),
            )
            .await
    }
}
