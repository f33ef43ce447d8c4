// ABOUTME: Broker orchestration: lifecycle workflows over injected stores, sealer and adapters
// ABOUTME: Holds no mutable state of its own; every call is independent and safe to run concurrently
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

//! # Broker Service
//!
//! [`BrokerService`] is the only component that sees plaintext secrets. It validates input
//! through `broker_core`, seals secrets before they reach a store, resolves the right secret at
//! invocation time and writes the audit trail.
//!
//! Authorization failures that would reveal another tenant's records are reported as
//! "not found", never "forbidden".

/// Access request workflow
pub mod access_requests;
/// Agent registry
pub mod agents;
/// Audit log
pub mod audit;
/// Static credential lifecycle
pub mod credentials;
/// Invocation authorizer
pub mod invocation;
/// OAuth connect handshake and grant refresh
pub mod provider_grants;

pub use access_requests::ReviewAccessRequestInput;
pub use audit::{AuditLog, ListAuditEventsInput};
pub use invocation::{InvokeAgentInput, InvokeAgentOutput};
pub use provider_grants::{ConnectStarted, FinishConnectInput, ListProviderGrantsInput};

use std::fmt;
use std::sync::Arc;

use broker_core::{Clock, IdGenerator, SystemClock, UuidV7Generator};

use crate::crypto::SecretSealer;
use crate::database::{
    AccessRequestStore, AgentStore, AuditEventStore, CredentialStore, Database, DatabaseError,
    ProviderConnectSessionStore, ProviderGrantStore,
};
use crate::errors::AppError;
use crate::providers::AdapterRegistry;

/// The store capabilities the broker depends on
#[derive(Clone)]
pub struct BrokerStores {
    /// Static credentials
    pub credentials: Arc<dyn CredentialStore>,
    /// Agent profiles
    pub agents: Arc<dyn AgentStore>,
    /// OAuth grants
    pub provider_grants: Arc<dyn ProviderGrantStore>,
    /// PKCE handshakes
    pub connect_sessions: Arc<dyn ProviderConnectSessionStore>,
    /// Sharing workflow
    pub access_requests: Arc<dyn AccessRequestStore>,
    /// Audit trail
    pub audit_events: Arc<dyn AuditEventStore>,
}

impl BrokerStores {
    /// Back every capability with one database
    #[must_use]
    pub fn from_database(database: &Database) -> Self {
        let database = Arc::new(database.clone());
        Self {
            credentials: database.clone(),
            agents: database.clone(),
            provider_grants: database.clone(),
            connect_sessions: database.clone(),
            access_requests: database.clone(),
            audit_events: database,
        }
    }
}

/// Orchestrates every broker operation
#[derive(Clone)]
pub struct BrokerService {
    stores: BrokerStores,
    sealer: Arc<SecretSealer>,
    adapters: AdapterRegistry,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    audit: AuditLog,
}

impl fmt::Debug for BrokerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerService")
            .field("sealer", &self.sealer)
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

impl BrokerService {
    /// Production wiring: wall clock and UUID v7 ids
    #[must_use]
    pub fn new(stores: BrokerStores, sealer: Arc<SecretSealer>, adapters: AdapterRegistry) -> Self {
        Self::with_clock(
            stores,
            sealer,
            adapters,
            Arc::new(SystemClock),
            Arc::new(UuidV7Generator),
        )
    }

    /// Wiring with explicit time and id sources
    #[must_use]
    pub fn with_clock(
        stores: BrokerStores,
        sealer: Arc<SecretSealer>,
        adapters: AdapterRegistry,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let audit = AuditLog::new(stores.audit_events.clone(), clock.clone(), ids.clone());
        Self {
            stores,
            sealer,
            adapters,
            clock,
            ids,
            audit,
        }
    }

    /// The audit log this service writes to
    #[must_use]
    pub const fn audit_log(&self) -> &AuditLog {
        &self.audit
    }
}

/// Replace store not-found detail with a fixed message so absent and foreign records look alike
pub(crate) fn mask_not_found(err: DatabaseError, message: &'static str) -> AppError {
    if err.is_not_found() {
        AppError::not_found(message)
    } else {
        err.into()
    }
}
