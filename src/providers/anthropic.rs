// ABOUTME: Anthropic messages invocation adapter
// ABOUTME: API keys go in x-api-key, OAuth access tokens as bearer; text blocks are concatenated
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::Provider;
use serde::{Deserialize, Serialize};

use super::{
    request_error, InvocationAdapter, InvocationOutput, InvocationRequest, ProviderError,
    SecretKind,
};
use crate::constants::provider_api::{
    ANTHROPIC_MAX_TOKENS, ANTHROPIC_OAUTH_BETA, ANTHROPIC_VERSION,
};

const PROVIDER: Provider = Provider::Anthropic;

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// `POST {base}/v1/messages`
pub struct AnthropicInvocationAdapter {
    http_client: reqwest::Client,
    endpoint: String,
}

impl AnthropicInvocationAdapter {
    /// Adapter against `base_url` (no trailing path)
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: &str) -> Self {
        Self {
            http_client,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl InvocationAdapter for AnthropicInvocationAdapter {
    async fn invoke(
        &self,
        request: InvocationRequest<'_>,
    ) -> Result<InvocationOutput, ProviderError> {
        let body = MessagesRequest {
            model: request.model,
            max_tokens: ANTHROPIC_MAX_TOKENS,
            messages: [Message {
                role: "user",
                content: request.input,
            }],
        };

        let builder = self
            .http_client
            .post(&self.endpoint)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let builder = match request.secret_kind {
            SecretKind::ApiKey => builder.header("x-api-key", request.secret),
            SecretKind::OAuthAccessToken => builder
                .bearer_auth(request.secret)
                .header("anthropic-beta", ANTHROPIC_OAUTH_BETA),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
            });
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider: PROVIDER,
                    message: e.without_url().to_string(),
                })?;

        let output_text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<String>();
        Ok(InvocationOutput { output_text })
    }
}
