// ABOUTME: Closed set of supported AI providers
// ABOUTME: Adding a provider is a compile-time change to this enum and the adapter registry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Supported AI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// `OpenAI`
    OpenAi,
    /// Anthropic
    Anthropic,
}

impl Provider {
    /// Every supported provider
    pub const ALL: [Self; 2] = [Self::OpenAi, Self::Anthropic];

    /// Stable wire/storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err(DomainError::MissingField { field: "provider" });
        }
        match value.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(DomainError::Unsupported {
                field: "provider",
                value: value.to_owned(),
            }),
        }
    }
}
