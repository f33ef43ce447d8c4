// ABOUTME: Domain error type shared by all lifecycle and validation functions
// ABOUTME: Distinguishes malformed input from illegal state transitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use thiserror::Error;

/// Result alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors raised by pure domain logic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A required field was absent or blank after trimming
    #[error("{field} is required")]
    MissingField {
        /// Name of the missing field
        field: &'static str,
    },

    /// A value outside the supported set
    #[error("unsupported {field}: {value}")]
    Unsupported {
        /// Name of the field
        field: &'static str,
        /// Rejected value
        value: String,
    },

    /// Input that is present but not acceptable
    #[error("{0}")]
    Invalid(String),

    /// A lifecycle transition not allowed from the current state
    #[error("{entity} cannot be {action} while {from}")]
    InvalidTransition {
        /// Entity kind, e.g. "access request"
        entity: &'static str,
        /// Current status
        from: String,
        /// Attempted action, e.g. "reviewed"
        action: &'static str,
    },
}

impl DomainError {
    /// Build an `Invalid` error from any message
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Whether this error describes a state conflict rather than bad input
    #[must_use]
    pub const fn is_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
