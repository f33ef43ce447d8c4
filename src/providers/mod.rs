// ABOUTME: Provider adapter contracts (OAuth and inference) and the fixed per-provider registry
// ABOUTME: Adding a provider means a new Provider variant plus an arm in every registry match
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

//! # Provider Adapters
//!
//! The broker talks to AI providers through two narrow traits:
//!
//! - [`OAuthAdapter`] builds authorization URLs and exchanges, refreshes and revokes tokens
//! - [`InvocationAdapter`] sends one prompt to a model with a resolved secret
//!
//! [`AdapterRegistry`] maps each [`Provider`] to an optional implementation of each trait.
//! Adapters hold no per-call state and are shared across concurrent requests.

/// Anthropic messages adapter
pub mod anthropic;
/// Generic OAuth 2.0 authorization-code adapter
pub mod oauth_http;
/// `OpenAI` chat completions adapter
pub mod openai;

pub use anthropic::AnthropicInvocationAdapter;
pub use oauth_http::HttpOAuthAdapter;
pub use openai::OpenAiInvocationAdapter;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker_core::models::Provider;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::constants::defaults;

/// Failures reported by provider adapters
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The registry has no adapter of the requested kind for this provider
    #[error("{provider} has no {capability} configured")]
    NotConfigured {
        /// Provider
        provider: Provider,
        /// `OAuth` or `invocation`
        capability: &'static str,
    },

    /// Transport failure before a response arrived
    #[error("{provider} request failed: {message}")]
    Request {
        /// Provider
        provider: Provider,
        /// Transport error text
        message: String,
    },

    /// Non-success HTTP status
    #[error("{provider} returned HTTP {status}")]
    Status {
        /// Provider
        provider: Provider,
        /// HTTP status code
        status: u16,
    },

    /// Response body did not have the expected shape
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse {
        /// Provider
        provider: Provider,
        /// Parse failure detail
        message: String,
    },
}

/// Token set returned by an exchange or refresh
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderTokens {
    /// Bearer token for inference
    pub access_token: String,
    /// Refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: Option<i64>,
    /// Scopes the provider actually granted
    pub scopes: Vec<String>,
}

impl fmt::Debug for ProviderTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Inputs to an authorization URL
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    /// CSRF state echoed back on the redirect
    pub state: &'a str,
    /// S256 PKCE challenge
    pub code_challenge: &'a str,
    /// Scopes to request
    pub scopes: &'a [String],
}

/// OAuth 2.0 authorization-code operations for one provider
#[async_trait]
pub trait OAuthAdapter: Send + Sync {
    /// Build the URL the user visits to grant access
    fn authorization_url(&self, request: AuthorizationRequest<'_>) -> Result<String, ProviderError>;

    /// Exchange an authorization code and PKCE verifier for tokens
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError>;

    /// Obtain a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens, ProviderError>;

    /// Revoke a token at the provider
    async fn revoke(&self, token: &str) -> Result<(), ProviderError>;
}

/// How the secret authenticates an inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// Static API key from a credential
    ApiKey,
    /// OAuth access token from a provider grant
    OAuthAccessToken,
}

/// One inference call
#[derive(Clone, Copy)]
pub struct InvocationRequest<'a> {
    /// Model name
    pub model: &'a str,
    /// Prompt text
    pub input: &'a str,
    /// Unsealed secret; lives only for this call
    pub secret: &'a str,
    /// Whether `secret` is an API key or an access token
    pub secret_kind: SecretKind,
}

impl fmt::Debug for InvocationRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationRequest")
            .field("model", &self.model)
            .field("input_len", &self.input.len())
            .field("secret", &"[REDACTED]")
            .field("secret_kind", &self.secret_kind)
            .finish()
    }
}

/// Model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    /// Text produced by the model; may be empty
    pub output_text: String,
}

/// Inference dispatch for one provider
#[async_trait]
pub trait InvocationAdapter: Send + Sync {
    /// Send the prompt and return the model's text
    async fn invoke(
        &self,
        request: InvocationRequest<'_>,
    ) -> Result<InvocationOutput, ProviderError>;
}

#[derive(Clone, Default)]
struct ProviderAdapters {
    oauth: Option<Arc<dyn OAuthAdapter>>,
    invocation: Option<Arc<dyn InvocationAdapter>>,
}

/// Adapters per supported provider
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    openai: ProviderAdapters,
    anthropic: ProviderAdapters,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for provider in Provider::ALL {
            let slot = self.slot(provider);
            map.entry(
                &provider.as_str(),
                &(slot.oauth.is_some(), slot.invocation.is_some()),
            );
        }
        map.finish()
    }
}

impl AdapterRegistry {
    /// Registry with no adapters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire HTTP adapters from configuration. Invocation adapters are always present;
    /// OAuth adapters only where OAuth settings exist.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn from_config(config: &ServerConfig) -> crate::errors::AppResult<Self> {
        let client = build_http_client(config.request_timeout)?;
        let mut registry = Self::new()
            .with_invocation(
                Provider::OpenAi,
                Arc::new(OpenAiInvocationAdapter::new(
                    client.clone(),
                    &config.openai.api_base_url,
                )),
            )
            .with_invocation(
                Provider::Anthropic,
                Arc::new(AnthropicInvocationAdapter::new(
                    client.clone(),
                    &config.anthropic.api_base_url,
                )),
            );
        for provider in Provider::ALL {
            if let Some(oauth) = &config.provider(provider).oauth {
                registry = registry.with_oauth(
                    provider,
                    Arc::new(HttpOAuthAdapter::new(provider, oauth.clone(), client.clone())),
                );
            }
        }
        Ok(registry)
    }

    /// Set the OAuth adapter for `provider`
    #[must_use]
    pub fn with_oauth(mut self, provider: Provider, adapter: Arc<dyn OAuthAdapter>) -> Self {
        self.slot_mut(provider).oauth = Some(adapter);
        self
    }

    /// Set the invocation adapter for `provider`
    #[must_use]
    pub fn with_invocation(
        mut self,
        provider: Provider,
        adapter: Arc<dyn InvocationAdapter>,
    ) -> Self {
        self.slot_mut(provider).invocation = Some(adapter);
        self
    }

    /// OAuth adapter for `provider`
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotConfigured`] when none is wired
    pub fn oauth(&self, provider: Provider) -> Result<Arc<dyn OAuthAdapter>, ProviderError> {
        self.slot(provider)
            .oauth
            .clone()
            .ok_or(ProviderError::NotConfigured {
                provider,
                capability: "OAuth adapter",
            })
    }

    /// Invocation adapter for `provider`
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotConfigured`] when none is wired
    pub fn invocation(
        &self,
        provider: Provider,
    ) -> Result<Arc<dyn InvocationAdapter>, ProviderError> {
        self.slot(provider)
            .invocation
            .clone()
            .ok_or(ProviderError::NotConfigured {
                provider,
                capability: "invocation adapter",
            })
    }

    const fn slot(&self, provider: Provider) -> &ProviderAdapters {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
        }
    }

    fn slot_mut(&mut self, provider: Provider) -> &mut ProviderAdapters {
        match provider {
            Provider::OpenAi => &mut self.openai,
            Provider::Anthropic => &mut self.anthropic,
        }
    }
}

/// Shared client for every provider call
///
/// # Errors
///
/// Returns a configuration error if the TLS backend cannot initialise
pub fn build_http_client(request_timeout: Duration) -> crate::errors::AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(defaults::PROVIDER_CONNECT_TIMEOUT_SECS))
        .timeout(request_timeout)
        .build()
        .map_err(|e| crate::errors::AppError::config(format!("Failed to build HTTP client: {e}")))
}

/// Map a reqwest transport error
pub(crate) fn request_error(provider: Provider, err: reqwest::Error) -> ProviderError {
    ProviderError::Request {
        provider,
        message: err.without_url().to_string(),
    }
}
