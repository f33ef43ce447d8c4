// ABOUTME: Main library entry point for the agent broker
// ABOUTME: Wires credentials, OAuth grants, agents, access requests and audit behind one HTTP API
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # Agent Broker
//!
//! A multi-tenant broker that lets users register AI-provider credentials (API keys or OAuth
//! grants), bind them to named agents and invoke those agents through a narrow proxy. Owners can
//! grant other users revocable, audited permission to invoke an agent without ever exposing its
//! secret material.
//!
//! ## Architecture
//!
//! - **`broker_core`**: validated domain records and their state machines
//! - **Database**: `SQLite` stores, one trait per record kind
//! - **Crypto**: AES-256-GCM sealing, PKCE and CSRF state helpers
//! - **Providers**: OAuth and inference adapters per supported provider
//! - **Broker**: the workflows, the only layer that sees plaintext secrets
//! - **Routes**: thin axum handlers over the broker
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use agent_broker::config::ServerConfig;
//! use agent_broker::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Agent broker configured with port: HTTP={}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Unified error handling
pub mod errors;

/// Environment variable names and defaults
pub mod constants;

/// Environment-driven configuration
pub mod config;

/// Structured logging setup
pub mod logging;

/// Secret sealing and PKCE
pub mod crypto;

/// Keyset pagination
pub mod pagination;

/// `SQLite` persistence
pub mod database;

/// Provider OAuth and invocation adapters
pub mod providers;

/// Broker workflows
pub mod broker;

/// Shared state handed to route handlers
pub mod resources;

/// HTTP route handlers
pub mod routes;

/// HTTP server assembly
pub mod server;
