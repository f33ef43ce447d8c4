// ABOUTME: ServerConfig loaded from BROKER_* environment variables with documented defaults
// ABOUTME: The sealing key is mandatory; OAuth settings are optional per provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use broker_core::models::Provider;
use http::HeaderName;
use url::Url;
use zeroize::Zeroizing;

use crate::constants::{defaults, env_vars, provider_api};
use crate::errors::{AppError, AppResult};
use crate::logging::LogFormat;

/// OAuth client settings for one provider
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthProviderConfig {
    /// Registered client id
    pub client_id: String,
    /// Client secret; public clients rely on PKCE alone
    pub client_secret: Option<String>,
    /// Authorization endpoint
    pub authorize_url: String,
    /// Token endpoint
    pub token_url: String,
    /// RFC 7009 revocation endpoint
    pub revoke_url: Option<String>,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

impl fmt::Debug for OAuthProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthProviderConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("revoke_url", &self.revoke_url)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Endpoint settings for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// OAuth client; `None` leaves the provider without an OAuth adapter
    pub oauth: Option<OAuthProviderConfig>,
    /// Inference API base URL
    pub api_base_url: String,
}

impl ProviderSettings {
    fn from_lookup(provider: Provider, lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let prefix = format!(
            "{}{}_",
            env_vars::PROVIDER_PREFIX,
            provider.as_str().to_ascii_uppercase()
        );
        let var = |suffix: &str| {
            lookup(&format!("{prefix}{suffix}"))
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let api_base_url = var("API_BASE_URL").unwrap_or_else(|| default_base_url(provider).to_owned());
        validate_url(&format!("{prefix}API_BASE_URL"), &api_base_url)?;

        let client_id = var("CLIENT_ID");
        let authorize_url = var("AUTHORIZE_URL");
        let token_url = var("TOKEN_URL");
        let redirect_uri = var("REDIRECT_URI");

        let oauth = match (client_id, authorize_url, token_url, redirect_uri) {
            (None, None, None, None) => None,
            (Some(client_id), Some(authorize_url), Some(token_url), Some(redirect_uri)) => {
                validate_url(&format!("{prefix}AUTHORIZE_URL"), &authorize_url)?;
                validate_url(&format!("{prefix}TOKEN_URL"), &token_url)?;
                validate_url(&format!("{prefix}REDIRECT_URI"), &redirect_uri)?;
                let revoke_url = var("REVOKE_URL");
                if let Some(revoke_url) = &revoke_url {
                    validate_url(&format!("{prefix}REVOKE_URL"), revoke_url)?;
                }
                Some(OAuthProviderConfig {
                    client_id,
                    client_secret: var("CLIENT_SECRET"),
                    authorize_url,
                    token_url,
                    revoke_url,
                    redirect_uri,
                })
            }
            _ => {
                return Err(AppError::config(format!(
                    "{prefix}CLIENT_ID, {prefix}AUTHORIZE_URL, {prefix}TOKEN_URL and \
                     {prefix}REDIRECT_URI must be set together"
                )))
            }
        };

        Ok(Self {
            oauth,
            api_base_url,
        })
    }

    /// Vendor defaults with no OAuth client
    #[must_use]
    pub fn vendor_default(provider: Provider) -> Self {
        Self {
            oauth: None,
            api_base_url: default_base_url(provider).to_owned(),
        }
    }
}

const fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => provider_api::OPENAI_BASE_URL,
        Provider::Anthropic => provider_api::ANTHROPIC_BASE_URL,
    }
}

fn validate_url(name: &str, value: &str) -> AppResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| AppError::config(format!("{name} is not a valid URL: {e}")))
}

/// Complete process configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen port
    pub http_port: u16,
    /// `SQLite` URL
    pub database_url: String,
    /// Base64 sealing key
    pub encryption_key: Zeroizing<String>,
    /// Header carrying the caller identity set by the fronting proxy
    pub caller_header: HeaderName,
    /// Per-request deadline
    pub request_timeout: Duration,
    /// Log encoding
    pub log_format: LogFormat,
    /// `OpenAI` endpoints
    pub openai: ProviderSettings,
    /// Anthropic endpoints
    pub anthropic: ProviderSettings,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_port", &self.http_port)
            .field("database_url", &self.database_url)
            .field("encryption_key", &"[REDACTED]")
            .field("caller_header", &self.caller_header)
            .field("request_timeout", &self.request_timeout)
            .field("log_format", &self.log_format)
            .field("openai", &self.openai)
            .field("anthropic", &self.anthropic)
            .finish()
    }
}

impl ServerConfig {
    /// Load from the process environment
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `BROKER_ENCRYPTION_KEY` is missing or any value is invalid
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the sealing key is missing or any value is invalid
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let encryption_key = var(env_vars::ENCRYPTION_KEY).ok_or_else(|| {
            AppError::config(format!(
                "{} must be set (generate one with `agent-broker generate-key`)",
                env_vars::ENCRYPTION_KEY
            ))
        })?;

        let http_port = parse_or(var(env_vars::HTTP_PORT), env_vars::HTTP_PORT, defaults::HTTP_PORT)?;
        let timeout_secs = parse_or(
            var(env_vars::REQUEST_TIMEOUT_SECS),
            env_vars::REQUEST_TIMEOUT_SECS,
            defaults::REQUEST_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(AppError::config(format!(
                "{} must be greater than zero",
                env_vars::REQUEST_TIMEOUT_SECS
            )));
        }

        let caller_header = var(env_vars::CALLER_HEADER)
            .unwrap_or_else(|| defaults::CALLER_HEADER.to_owned());
        let caller_header = HeaderName::from_str(&caller_header.to_ascii_lowercase()).map_err(|e| {
            AppError::config(format!("{} is not a valid header name: {e}", env_vars::CALLER_HEADER))
        })?;

        let log_format = var(env_vars::LOG_FORMAT)
            .map_or(Ok(LogFormat::default()), |value| value.parse())?;

        Ok(Self {
            http_port,
            database_url: var(env_vars::DATABASE_URL)
                .unwrap_or_else(|| defaults::DATABASE_URL.to_owned()),
            encryption_key: Zeroizing::new(encryption_key),
            caller_header,
            request_timeout: Duration::from_secs(timeout_secs),
            log_format,
            openai: ProviderSettings::from_lookup(Provider::OpenAi, lookup)?,
            anthropic: ProviderSettings::from_lookup(Provider::Anthropic, lookup)?,
        })
    }

    /// Endpoint settings for `provider`
    #[must_use]
    pub const fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::Anthropic => &self.anthropic,
        }
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|e| AppError::config(format!("{name} is invalid ({raw:?}): {e}")))
    })
}
