// ABOUTME: Domain crate for the agent broker: records, status machines and input validation
// ABOUTME: Pure functions over domain values; time and identifiers are injected, never global
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

#![deny(unsafe_code)]

//! # Broker Core
//!
//! Everything in this crate is free of I/O. Lifecycle functions take domain values plus an
//! injected [`Clock`] and [`IdGenerator`] and return new values or a [`DomainError`].
//! Persistence, sealing and provider calls live in the `agent_broker` crate.

/// Injected time and identifier sources
pub mod clock;
/// Domain validation and transition errors
pub mod errors;
/// Domain records and their state machines
pub mod models;
/// Shared input normalisation helpers
pub mod validation;

pub use clock::{Clock, IdGenerator, SystemClock, UuidV7Generator};
pub use errors::{DomainError, DomainResult};
