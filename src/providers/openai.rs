// ABOUTME: OpenAI chat-completions invocation adapter with bearer authentication
// ABOUTME: Sends one user message and returns the first choice's text
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::Provider;
use serde::{Deserialize, Serialize};

use super::{request_error, InvocationAdapter, InvocationOutput, InvocationRequest, ProviderError};

const PROVIDER: Provider = Provider::OpenAi;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `POST {base}/v1/chat/completions`
pub struct OpenAiInvocationAdapter {
    http_client: reqwest::Client,
    endpoint: String,
}

impl OpenAiInvocationAdapter {
    /// Adapter against `base_url` (no trailing path)
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: &str) -> Self {
        Self {
            http_client,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl InvocationAdapter for OpenAiInvocationAdapter {
    async fn invoke(
        &self,
        request: InvocationRequest<'_>,
    ) -> Result<InvocationOutput, ProviderError> {
        // API keys and OAuth access tokens are both bearer tokens here
        let body = ChatCompletionRequest {
            model: request.model,
            messages: [ChatMessage {
                role: "user",
                content: request.input,
            }],
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(request.secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedResponse {
                    provider: PROVIDER,
                    message: e.without_url().to_string(),
                })?;

        let output_text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(InvocationOutput { output_text })
    }
}
