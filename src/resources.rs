// ABOUTME: ServerResources bundles the broker service and request-scoped settings for handlers
// ABOUTME: Built once at startup and shared behind an Arc by every router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::sync::Arc;
use std::time::Duration;

use http::HeaderName;

use crate::broker::{BrokerService, BrokerStores};
use crate::config::ServerConfig;
use crate::crypto::SecretSealer;
use crate::database::Database;
use crate::errors::AppResult;
use crate::providers::AdapterRegistry;

/// Everything a route handler needs
#[derive(Debug, Clone)]
pub struct ServerResources {
    /// Broker workflows
    pub broker: BrokerService,
    /// Header carrying the trusted caller identity
    pub caller_header: HeaderName,
    /// Deadline applied to each request
    pub request_timeout: Duration,
}

impl ServerResources {
    /// Assemble resources around an already-built broker
    #[must_use]
    pub const fn new(
        broker: BrokerService,
        caller_header: HeaderName,
        request_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            caller_header,
            request_timeout,
        }
    }

    /// Production wiring: sealer from the configured key, adapters from provider settings
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is invalid or the adapters cannot be built
    pub fn from_config(config: &ServerConfig, database: &Database) -> AppResult<Arc<Self>> {
        let sealer = Arc::new(SecretSealer::from_base64(&config.encryption_key)?);
        let adapters = AdapterRegistry::from_config(config)?;
        let broker = BrokerService::new(BrokerStores::from_database(database), sealer, adapters);
        Ok(Arc::new(Self::new(
            broker,
            config.caller_header.clone(),
            config.request_timeout,
        )))
    }
}
