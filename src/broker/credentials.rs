// ABOUTME: Credential lifecycle: store sealed API keys, list summaries, revoke
// ABOUTME: Plaintext secrets exist only between input validation and the seal call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use broker_core::models::{
    AuditEventName, CreateCredentialInput, CredentialSummary, NewCredential,
};
use broker_core::validation::required;
use tracing::{info, instrument};

use super::{mask_not_found, BrokerService};
use crate::errors::AppResult;
use crate::pagination::{Page, PageRequest};

const RESOURCE: &str = "credential";

impl BrokerService {
    /// `CreateCredential`
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing or unsupported fields
    #[instrument(skip(self, caller, input), fields(owner_user_id = %caller))]
    pub async fn create_credential(
        &self,
        caller: &str,
        mut input: CreateCredentialInput,
    ) -> AppResult<CredentialSummary> {
        input.owner_user_id = caller.to_owned();
        let new = NewCredential::normalize(input)?;
        let ciphertext = self.sealer.seal(&new.secret)?;
        let credential = new.create(ciphertext, self.clock.as_ref(), self.ids.as_ref());

        self.stores.credentials.insert(&credential).await?;
        info!(credential_id = %credential.id, provider = %credential.provider, "Credential created");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::CredentialCreated, caller, caller)
                    .with_resource(RESOURCE, &credential.id),
            )
            .await?;
        Ok(credential.summary())
    }

    /// `ListCredentials`, owner-scoped
    ///
    /// # Errors
    ///
    /// Returns a database error if the listing fails
    pub async fn list_credentials(
        &self,
        caller: &str,
        page: &PageRequest,
    ) -> AppResult<Page<CredentialSummary>> {
        let credentials = self.stores.credentials.list(caller, page).await?;
        Ok(credentials.map(|credential| credential.summary()))
    }

    /// `RevokeCredential`: `active -> revoked`
    ///
    /// # Errors
    ///
    /// Returns not-found for absent or foreign credentials, failed-precondition when already
    /// revoked and conflict when a concurrent revoke wins
    #[instrument(skip(self, caller), fields(owner_user_id = %caller))]
    pub async fn revoke_credential(
        &self,
        caller: &str,
        credential_id: &str,
    ) -> AppResult<CredentialSummary> {
        let credential_id = required("credential_id", credential_id)?;
        let current = self
            .stores
            .credentials
            .get(caller, &credential_id)
            .await
            .map_err(|e| mask_not_found(e, "credential not found"))?;
        current.status.revoke()?;

        let revoked = self
            .stores
            .credentials
            .revoke(caller, &credential_id, self.clock.now())
            .await?;
        info!(credential_id = %revoked.id, "Credential revoked");

        self.audit
            .record(
                self.audit
                    .event(AuditEventName::CredentialRevoked, caller, caller)
                    .with_resource(RESOURCE, &revoked.id),
            )
            .await?;
        Ok(revoked.summary())
    }
}
