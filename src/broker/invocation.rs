// ABOUTME: Invocation authorizer: decides who may invoke an agent, resolves its secret and dispatches
// ABOUTME: Shared invocations are audited; owner invocations are not
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use broker_core::models::{AccessRequest, Agent, AgentAccess, AuditEventName, AuthReference};
use broker_core::validation::required;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use super::agents::AGENT_NOT_FOUND;
use super::{mask_not_found, BrokerService};
use crate::errors::{AppError, AppResult};
use crate::providers::{InvocationRequest, SecretKind};

/// Prompt for one invocation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvokeAgentInput {
    /// Prompt text
    #[serde(default)]
    pub input: String,
}

/// Model output for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvokeAgentOutput {
    /// Agent invoked
    pub agent_id: String,
    /// Text produced by the model
    pub output_text: String,
    /// How the caller reached the agent
    pub access: AgentAccess,
}

impl BrokerService {
    /// Owner, or holder of the matching approved invoke request. Anything else looks absent.
    async fn authorize_invoke(
        &self,
        caller: &str,
        agent: &Agent,
    ) -> AppResult<Option<AccessRequest>> {
        if agent.owner_user_id == caller {
            return Ok(None);
        }
        let approval = self
            .stores
            .access_requests
            .find_approved_invoke(caller, &agent.owner_user_id, &agent.id)
            .await?;
        match approval {
            Some(request) if request.authorizes_invoke(caller, &agent.owner_user_id, &agent.id) => {
                Ok(Some(request))
            }
            _ => Err(AppError::not_found(AGENT_NOT_FOUND)),
        }
    }

    /// Unseal the one secret the agent is bound to
    async fn resolve_secret(&self, agent: &Agent) -> AppResult<(Zeroizing<String>, SecretKind)> {
        match &agent.auth {
            AuthReference::Credential(credential_id) => {
                let credential = self
                    .stores
                    .credentials
                    .get(&agent.owner_user_id, credential_id)
                    .await
                    .map_err(|e| mask_not_found(e, "credential not found"))?;
                if !credential.is_usable_by(&agent.owner_user_id, agent.provider) {
                    return Err(AppError::not_found("credential not found"));
                }
                let secret = self.sealer.open(&credential.secret_ciphertext)?;
                Ok((secret, SecretKind::ApiKey))
            }
            AuthReference::ProviderGrant(grant_id) => {
                let access_token = self
                    .resolve_provider_grant_for_invocation(
                        &agent.owner_user_id,
                        grant_id,
                        Some(agent.provider),
                    )
                    .await?;
                Ok((access_token, SecretKind::OAuthAccessToken))
            }
        }
    }

    /// `InvokeAgent`
    ///
    /// # Errors
    ///
    /// Returns not-found when the caller may not invoke the agent or its secret is unusable,
    /// failed-precondition when no adapter is wired or a grant cannot be refreshed, an upstream
    /// error when the provider call fails and an internal error for empty output
    #[instrument(skip(self, caller, input), fields(user_id = %caller, agent_id = %agent_id))]
    pub async fn invoke_agent(
        &self,
        caller: &str,
        agent_id: &str,
        input: InvokeAgentInput,
    ) -> AppResult<InvokeAgentOutput> {
        let agent_id = required("agent_id", agent_id)?;
        let prompt = required("input", &input.input)?;

        let agent = self
            .stores
            .agents
            .get(&agent_id)
            .await
            .map_err(|e| mask_not_found(e, AGENT_NOT_FOUND))?;
        let approval = self.authorize_invoke(caller, &agent).await?;

        let (secret, secret_kind) = self.resolve_secret(&agent).await?;
        let adapter = self.adapters.invocation(agent.provider)?;
        let output = adapter
            .invoke(InvocationRequest {
                model: &agent.model,
                input: &prompt,
                secret: &secret,
                secret_kind,
            })
            .await
            .map_err(|e| {
                warn!(provider = %agent.provider, error = %e, "Agent invocation failed");
                AppError::from(e)
            })?;
        drop(secret);

        if output.output_text.trim().is_empty() {
            return Err(AppError::internal("provider returned empty output"));
        }

        let access = match &approval {
            Some(request) => {
                self.audit
                    .record(
                        self.audit
                            .event(AuditEventName::AgentInvokeShared, caller, &agent.owner_user_id)
                            .with_requester(caller)
                            .with_agent(&agent.id)
                            .with_access_request(&request.id),
                    )
                    .await?;
                AgentAccess::Shared
            }
            None => AgentAccess::Owner,
        };
        info!(provider = %agent.provider, access = ?access, "Agent invoked");

        Ok(InvokeAgentOutput {
            agent_id: agent.id,
            output_text: output.output_text,
            access,
        })
    }
}
