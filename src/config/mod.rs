// ABOUTME: Configuration module for the broker process
// ABOUTME: Environment-driven server, sealing and per-provider endpoint settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

/// Environment variable loading
pub mod environment;

pub use environment::{OAuthProviderConfig, ProviderSettings, ServerConfig};
