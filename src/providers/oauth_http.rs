// ABOUTME: OAuth 2.0 authorization-code + PKCE adapter over plain HTTP form posts
// ABOUTME: Works for any provider whose endpoints follow RFC 6749, RFC 7636 and RFC 7009
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::Provider;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{
    request_error, AuthorizationRequest, OAuthAdapter, ProviderError, ProviderTokens,
};
use crate::config::OAuthProviderConfig;

/// Token endpoint response body
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-delimited granted scopes
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_tokens(self, provider: Provider) -> Result<ProviderTokens, ProviderError> {
        if self.access_token.trim().is_empty() {
            return Err(ProviderError::MalformedResponse {
                provider,
                message: "empty access_token".to_owned(),
            });
        }
        Ok(ProviderTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|token| !token.trim().is_empty()),
            expires_in: self.expires_in,
            scopes: self
                .scope
                .map(|scope| scope.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
        })
    }
}

/// Authorization-code adapter driven by [`OAuthProviderConfig`]
pub struct HttpOAuthAdapter {
    provider: Provider,
    config: OAuthProviderConfig,
    http_client: reqwest::Client,
}

impl HttpOAuthAdapter {
    /// Build an adapter sharing `http_client`
    #[must_use]
    pub const fn new(
        provider: Provider,
        config: OAuthProviderConfig,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            config,
            http_client,
        }
    }

    fn with_client_auth<'a>(&'a self, params: &mut Vec<(&'static str, &'a str)>) {
        params.push(("client_id", &self.config.client_id));
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret));
        }
    }

    async fn token_request(
        &self,
        params: &[(&'static str, &str)],
    ) -> Result<ProviderTokens, ProviderError> {
        let response = self
            .http_client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| request_error(self.provider, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider = %self.provider, status = status.as_u16(), "Token endpoint rejected request");
            return Err(ProviderError::Status {
                provider: self.provider,
                status: status.as_u16(),
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider: self.provider,
                    message: e.without_url().to_string(),
                })?;
        body.into_tokens(self.provider)
    }
}

#[async_trait]
impl OAuthAdapter for HttpOAuthAdapter {
    fn authorization_url(&self, request: AuthorizationRequest<'_>) -> Result<String, ProviderError> {
        let mut url =
            Url::parse(&self.config.authorize_url).map_err(|_| ProviderError::NotConfigured {
                provider: self.provider,
                capability: "valid authorize URL",
            })?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &request.scopes.join(" "))
            .append_pair("state", request.state)
            .append_pair("code_challenge", request.code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderTokens, ProviderError> {
        debug!(provider = %self.provider, "Exchanging authorization code");
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.with_client_auth(&mut params);
        self.token_request(&params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens, ProviderError> {
        debug!(provider = %self.provider, "Refreshing access token");
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.with_client_auth(&mut params);
        self.token_request(&params).await
    }

    async fn revoke(&self, token: &str) -> Result<(), ProviderError> {
        let Some(revoke_url) = &self.config.revoke_url else {
            return Err(ProviderError::NotConfigured {
                provider: self.provider,
                capability: "revocation endpoint",
            });
        };

        let mut params = vec![("token", token)];
        self.with_client_auth(&mut params);
        let response = self
            .http_client
            .post(revoke_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_error(self.provider, e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Status {
                provider: self.provider,
                status: response.status().as_u16(),
            })
        }
    }
}
