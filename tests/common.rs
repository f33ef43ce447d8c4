// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides in-memory database, manual clock, sequential ids and recording adapters
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `agent_broker`
//!
//! This module provides common test setup functions to reduce duplication
//! across integration tests.

use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration as StdDuration;

use agent_broker::broker::{BrokerService, BrokerStores};
use agent_broker::crypto::{generate_encryption_key, SecretSealer};
use agent_broker::database::Database;
use agent_broker::providers::{
    AdapterRegistry, AuthorizationRequest, InvocationAdapter, InvocationOutput, InvocationRequest,
    OAuthAdapter, ProviderError, ProviderTokens, SecretKind,
};
use agent_broker::resources::ServerResources;
use async_trait::async_trait;
use broker_core::models::{
    AccessRequest, AgentView, CreateAccessRequestInput, CreateAgentInput, CreateCredentialInput,
    CredentialSummary, Provider,
};
use broker_core::{Clock, IdGenerator, UuidV7Generator};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http::HeaderName;

use agent_broker::broker::ReviewAccessRequestInput;

static INIT_LOGGER: Once = Once::new();

/// Header the test resources trust for caller identity
pub const CALLER_HEADER: &str = "x-broker-caller-id";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        let _ = tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Deterministic time and ids
// ============================================================================

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_at_epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Zero-padded counter ids, so lexical order is creation order
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("id-{n:08}")
    }
}

// ============================================================================
// Recording adapters
// ============================================================================

/// Fake OAuth provider that hands out numbered tokens and records every call
#[derive(Default)]
pub struct RecordingOAuthAdapter {
    issued: AtomicU64,
    fail_exchange: AtomicBool,
    fail_refresh: AtomicBool,
    rotate_refresh_token: AtomicBool,
    expires_in: Mutex<Option<i64>>,
    pub exchanged: Mutex<Vec<(String, String)>>,
    pub refreshed_with: Mutex<Vec<String>>,
    pub revoked: Mutex<Vec<String>>,
}

impl RecordingOAuthAdapter {
    pub fn new() -> Self {
        let adapter = Self::default();
        *adapter.expires_in.lock().unwrap() = Some(3600);
        adapter
    }

    pub fn set_expires_in(&self, seconds: Option<i64>) {
        *self.expires_in.lock().unwrap() = seconds;
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn fail_exchange(&self, fail: bool) {
        self.fail_exchange.store(fail, Ordering::SeqCst);
    }

    pub fn rotate_refresh_token(&self, rotate: bool) {
        self.rotate_refresh_token.store(rotate, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshed_with.lock().unwrap().len()
    }

    fn next_serial(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl OAuthAdapter for RecordingOAuthAdapter {
    fn authorization_url(&self, request: AuthorizationRequest<'_>) -> Result<String, ProviderError> {
        Ok(format!(
            "https://auth.example.test/authorize?state={}&code_challenge={}&scope={}",
            request.state,
            request.code_challenge,
            request.scopes.join("+")
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError> {
        self.exchanged
            .lock()
            .unwrap()
            .push((code.to_owned(), code_verifier.to_owned()));
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                provider: Provider::Anthropic,
                status: 400,
            });
        }
        let n = self.next_serial();
        Ok(ProviderTokens {
            access_token: format!("access-{n}"),
            refresh_token: Some(format!("refresh-{n}")),
            expires_in: *self.expires_in.lock().unwrap(),
            scopes: vec!["inference".to_owned()],
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens, ProviderError> {
        self.refreshed_with
            .lock()
            .unwrap()
            .push(refresh_token.to_owned());
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                provider: Provider::Anthropic,
                status: 401,
            });
        }
        let n = self.next_serial();
        let refresh_token = self
            .rotate_refresh_token
            .load(Ordering::SeqCst)
            .then(|| format!("refresh-{n}"));
        Ok(ProviderTokens {
            access_token: format!("access-{n}"),
            refresh_token,
            expires_in: Some(3600),
            scopes: vec![],
        })
    }

    async fn revoke(&self, token: &str) -> Result<(), ProviderError> {
        self.revoked.lock().unwrap().push(token.to_owned());
        Ok(())
    }
}

/// One recorded inference call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub model: String,
    pub input: String,
    pub secret: String,
    pub secret_kind: SecretKind,
}

/// Fake inference adapter that echoes the prompt
#[derive(Default)]
pub struct RecordingInvocationAdapter {
    empty_output: AtomicBool,
    pub calls: Mutex<Vec<RecordedInvocation>>,
}

impl RecordingInvocationAdapter {
    pub fn return_empty_output(&self, empty: bool) {
        self.empty_output.store(empty, Ordering::SeqCst);
    }

    pub fn last_call(&self) -> Option<RecordedInvocation> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl InvocationAdapter for RecordingInvocationAdapter {
    async fn invoke(
        &self,
        request: InvocationRequest<'_>,
    ) -> Result<InvocationOutput, ProviderError> {
        self.calls.lock().unwrap().push(RecordedInvocation {
            model: request.model.to_owned(),
            input: request.input.to_owned(),
            secret: request.secret.to_owned(),
            secret_kind: request.secret_kind,
        });
        let output_text = if self.empty_output.load(Ordering::SeqCst) {
            "   ".to_owned()
        } else {
            format!("echo: {}", request.input)
        };
        Ok(InvocationOutput { output_text })
    }
}

// ============================================================================
// Service wiring
// ============================================================================

/// A broker over an in-memory database with every collaborator exposed
pub struct TestBroker {
    pub service: BrokerService,
    pub database: Database,
    pub sealer: Arc<SecretSealer>,
    pub clock: Arc<ManualClock>,
    pub oauth: Arc<RecordingOAuthAdapter>,
    pub openai: Arc<RecordingInvocationAdapter>,
    pub anthropic: Arc<RecordingInvocationAdapter>,
}

impl TestBroker {
    pub async fn new() -> Self {
        init_test_logging();
        let database = Database::in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::starting_at_epoch());
        let oauth = Arc::new(RecordingOAuthAdapter::new());
        let openai = Arc::new(RecordingInvocationAdapter::default());
        let anthropic = Arc::new(RecordingInvocationAdapter::default());

        let adapters = AdapterRegistry::new()
            .with_oauth(Provider::Anthropic, oauth.clone())
            .with_invocation(Provider::OpenAi, openai.clone())
            .with_invocation(Provider::Anthropic, anthropic.clone());
        let sealer = Arc::new(SecretSealer::new(&generate_encryption_key()).unwrap());
        let service = BrokerService::with_clock(
            BrokerStores::from_database(&database),
            sealer.clone(),
            adapters,
            clock.clone(),
            Arc::new(SequentialIds::default()),
        );

        Self {
            service,
            database,
            sealer,
            clock,
            oauth,
            openai,
            anthropic,
        }
    }

    /// Stores backed by this broker's database
    pub fn stores(&self) -> BrokerStores {
        BrokerStores::from_database(&self.database)
    }

    /// A second service over the same clock and sealer with its own stores and adapters.
    /// Ids are UUID v7 so they never collide with the sequential ids of `service`.
    pub fn service_with(&self, stores: BrokerStores, adapters: AdapterRegistry) -> BrokerService {
        BrokerService::with_clock(
            stores,
            self.sealer.clone(),
            adapters,
            self.clock.clone(),
            Arc::new(UuidV7Generator),
        )
    }

    /// Resources for route tests
    pub fn resources(&self) -> Arc<ServerResources> {
        Arc::new(ServerResources::new(
            self.service.clone(),
            HeaderName::from_static(CALLER_HEADER),
            StdDuration::from_secs(5),
        ))
    }

    pub async fn credential(&self, owner: &str, provider: &str, secret: &str) -> CredentialSummary {
        self.service
            .create_credential(
                owner,
                CreateCredentialInput {
                    owner_user_id: String::new(),
                    provider: provider.to_owned(),
                    label: format!("{provider} key"),
                    secret: secret.to_owned(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn credential_agent(&self, owner: &str, name: &str, credential_id: &str) -> AgentView {
        self.service
            .create_agent(
                owner,
                CreateAgentInput {
                    owner_user_id: String::new(),
                    name: name.to_owned(),
                    provider: "openai".to_owned(),
                    model: "gpt-4o-mini".to_owned(),
                    credential_id: Some(credential_id.to_owned()),
                    provider_grant_id: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn grant_agent(&self, owner: &str, name: &str, grant_id: &str) -> AgentView {
        self.service
            .create_agent(
                owner,
                CreateAgentInput {
                    owner_user_id: String::new(),
                    name: name.to_owned(),
                    provider: "anthropic".to_owned(),
                    model: "claude-sonnet-4".to_owned(),
                    credential_id: None,
                    provider_grant_id: Some(grant_id.to_owned()),
                },
            )
            .await
            .unwrap()
    }

    /// Run a full connect handshake against the recording OAuth adapter
    pub async fn connected_grant(&self, owner: &str) -> broker_core::models::ProviderGrantSummary {
        let started = self
            .service
            .start_provider_connect(
                owner,
                broker_core::models::StartConnectInput {
                    owner_user_id: String::new(),
                    provider: "anthropic".to_owned(),
                    requested_scopes: vec!["inference".to_owned()],
                },
            )
            .await
            .unwrap();
        self.service
            .finish_provider_connect(
                owner,
                &started.session_id,
                agent_broker::broker::FinishConnectInput {
                    state: started.state,
                    code: "auth-code".to_owned(),
                },
            )
            .await
            .unwrap()
    }

    /// Request and approve invoke access to `agent_id` for `requester`
    pub async fn approved_access(
        &self,
        requester: &str,
        owner: &str,
        agent_id: &str,
    ) -> AccessRequest {
        let request = self
            .service
            .create_access_request(
                requester,
                CreateAccessRequestInput {
                    requester_user_id: String::new(),
                    owner_user_id: owner.to_owned(),
                    agent_id: agent_id.to_owned(),
                    scope: String::new(),
                    request_note: Some("please".to_owned()),
                },
            )
            .await
            .unwrap();
        self.service
            .review_access_request(
                owner,
                &request.id,
                ReviewAccessRequestInput {
                    decision: "approve".to_owned(),
                    note: None,
                },
            )
            .await
            .unwrap()
    }
}
