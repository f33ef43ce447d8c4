// ABOUTME: Environment variable names, defaults and provider endpoint constants
// ABOUTME: Single place for every tunable the broker reads at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

/// Environment variable names
pub mod env_vars {
    /// Listen port
    pub const HTTP_PORT: &str = "BROKER_HTTP_PORT";
    /// `SQLite` URL
    pub const DATABASE_URL: &str = "BROKER_DATABASE_URL";
    /// Base64 32-byte sealing key
    pub const ENCRYPTION_KEY: &str = "BROKER_ENCRYPTION_KEY";
    /// Trusted caller identity header
    pub const CALLER_HEADER: &str = "BROKER_CALLER_HEADER";
    /// Per-request deadline in seconds
    pub const REQUEST_TIMEOUT_SECS: &str = "BROKER_REQUEST_TIMEOUT_SECS";
    /// `text` or `json`
    pub const LOG_FORMAT: &str = "BROKER_LOG_FORMAT";
    /// Prefix for per-provider settings, followed by the upper-case provider name
    pub const PROVIDER_PREFIX: &str = "BROKER_";
}

/// Defaults applied when a variable is unset
pub mod defaults {
    /// Listen port
    pub const HTTP_PORT: u16 = 8088;
    /// Database location
    pub const DATABASE_URL: &str = "sqlite:./data/broker.db";
    /// Trusted caller identity header
    pub const CALLER_HEADER: &str = "x-broker-caller-id";
    /// Per-request deadline
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Connect timeout for provider HTTP calls
    pub const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 10;
}

/// Provider API defaults
pub mod provider_api {
    /// `OpenAI` inference base URL
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
    /// Anthropic inference base URL
    pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
    /// Anthropic API version header value
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
    /// Anthropic beta flag required for OAuth bearer tokens
    pub const ANTHROPIC_OAUTH_BETA: &str = "oauth-2025-04-20";
    /// Output token cap for Anthropic messages
    pub const ANTHROPIC_MAX_TOKENS: u32 = 1024;
}
