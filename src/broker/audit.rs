// ABOUTME: Append-only audit log for lifecycle and shared-invocation events
// ABOUTME: Every persisted event is mirrored to tracing; listing is always owner-scoped
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::sync::Arc;

use broker_core::models::{AuditEventFilter, AuditEventName, AuditEventRecord, AuditOutcome};
use broker_core::validation::optional;
use broker_core::{Clock, IdGenerator};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::BrokerService;
use crate::database::AuditEventStore;
use crate::errors::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};

/// Audit logger backed by an [`AuditEventStore`]
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditEventStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl AuditLog {
    /// Create a logger over `store`
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditEventStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Start a successful event stamped with the injected clock and id generator
    #[must_use]
    pub fn event(
        &self,
        event_name: AuditEventName,
        actor_user_id: &str,
        owner_user_id: &str,
    ) -> AuditEventRecord {
        AuditEventRecord::new(
            event_name,
            actor_user_id,
            owner_user_id,
            self.clock.as_ref(),
            self.ids.as_ref(),
        )
    }

    fn log_to_structured_logger(event: &AuditEventRecord) {
        match event.outcome {
            AuditOutcome::Success => info!(
                event_id = %event.id,
                event_name = %event.event_name,
                actor_user_id = %event.actor_user_id,
                owner_user_id = %event.owner_user_id,
                requester_user_id = ?event.requester_user_id,
                agent_id = ?event.agent_id,
                access_request_id = ?event.access_request_id,
                resource = ?event.resource,
                "Audit event"
            ),
            AuditOutcome::Failure => warn!(
                event_id = %event.id,
                event_name = %event.event_name,
                actor_user_id = %event.actor_user_id,
                owner_user_id = %event.owner_user_id,
                requester_user_id = ?event.requester_user_id,
                agent_id = ?event.agent_id,
                access_request_id = ?event.access_request_id,
                resource = ?event.resource,
                "Audit event (failure)"
            ),
        }
    }

    /// Validate, persist and mirror an event
    ///
    /// # Errors
    ///
    /// Returns an internal error for events missing required identity fields, or a database
    /// error if the append fails
    pub async fn record(&self, event: AuditEventRecord) -> AppResult<()> {
        event.validate().map_err(|e| {
            AppError::internal(format!("Refusing incomplete {} event: {e}", event.event_name))
        })?;

        self.store.append(&event).await?;
        Self::log_to_structured_logger(&event);
        debug!(event_id = %event.id, "Stored audit event");
        Ok(())
    }

    /// Owner-scoped listing
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing owner or inverted time window
    pub async fn list(
        &self,
        filter: &AuditEventFilter,
        page: &PageRequest,
    ) -> AppResult<Page<AuditEventRecord>> {
        filter.validate()?;
        Ok(self.store.list(filter, page).await?)
    }
}

/// Raw audit listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAuditEventsInput {
    /// Event name, e.g. `agent.invoke.shared`
    #[serde(default)]
    pub event_name: Option<String>,
    /// Agent id
    #[serde(default)]
    pub agent_id: Option<String>,
    /// RFC 3339 inclusive lower bound
    #[serde(default)]
    pub created_after: Option<String>,
    /// RFC 3339 inclusive upper bound
    #[serde(default)]
    pub created_before: Option<String>,
}

impl ListAuditEventsInput {
    /// Build the filter scoped to `owner_user_id`
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown event names or unparseable timestamps
    pub fn into_filter(self, owner_user_id: &str) -> AppResult<AuditEventFilter> {
        let event_name = optional(self.event_name.as_deref())
            .map(|name| name.parse::<AuditEventName>())
            .transpose()?;
        Ok(AuditEventFilter {
            owner_user_id: owner_user_id.to_owned(),
            event_name,
            agent_id: optional(self.agent_id.as_deref()),
            created_after: parse_time("created_after", self.created_after.as_deref())?,
            created_before: parse_time("created_before", self.created_before.as_deref())?,
        })
    }
}

fn parse_time(field: &str, value: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    optional(value)
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AppError::invalid_input(format!("{field} must be RFC 3339: {e}")))
        })
        .transpose()
}

impl BrokerService {
    /// `ListAuditEvents`: the caller's own audit trail
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed filters or an inverted time window
    pub async fn list_audit_events(
        &self,
        caller: &str,
        input: ListAuditEventsInput,
        page: &PageRequest,
    ) -> AppResult<Page<AuditEventRecord>> {
        let filter = input.into_filter(caller)?;
        self.audit.list(&filter, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_parses_into_owner_scoped_filter() {
        let filter = ListAuditEventsInput {
            event_name: Some("agent.invoke.shared".to_owned()),
            agent_id: Some(" ".to_owned()),
            created_after: Some("2025-01-01T00:00:00Z".to_owned()),
            created_before: None,
        }
        .into_filter("owner-1")
        .unwrap();
        assert_eq!(filter.owner_user_id, "owner-1");
        assert_eq!(filter.event_name, Some(AuditEventName::AgentInvokeShared));
        assert!(filter.agent_id.is_none());
        assert!(filter.created_after.is_some());
    }

    #[test]
    fn malformed_filters_are_validation_errors() {
        let bad_name = ListAuditEventsInput {
            event_name: Some("agent.exploded".to_owned()),
            ..ListAuditEventsInput::default()
        };
        assert_eq!(
            bad_name.into_filter("o").unwrap_err().code,
            crate::errors::ErrorCode::InvalidInput
        );

        let bad_time = ListAuditEventsInput {
            created_before: Some("yesterday".to_owned()),
            ..ListAuditEventsInput::default()
        };
        assert!(bad_time.into_filter("o").is_err());
    }
}
