// ABOUTME: Persistence error type shared by every store interface
// ABOUTME: Distinguishes not-found and state-guard conflicts from query failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use thiserror::Error;

/// Result alias for store operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Store-level failures
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// No row matched the id and owner scope
    #[error("{entity} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// A conditional update matched zero rows because the expected prior state was gone
    #[error("{entity} {id} is no longer {expected}")]
    Conflict {
        /// Entity kind
        entity: &'static str,
        /// Target id
        id: String,
        /// Status the update was guarded on
        expected: &'static str,
    },

    /// Driver or SQL failure
    #[error("database query failed: {context}")]
    QueryError {
        /// What was being attempted
        context: String,
    },

    /// Stored value could not be mapped back to the domain
    #[error("corrupt {entity} row: {reason}")]
    CorruptRow {
        /// Entity kind
        entity: &'static str,
        /// Parse failure
        reason: String,
    },
}

impl DatabaseError {
    /// Not-found helper
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Conflict helper
    pub fn conflict(entity: &'static str, id: impl Into<String>, expected: &'static str) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
            expected,
        }
    }

    /// Corrupt-row helper
    pub fn corrupt(entity: &'static str, reason: impl ToString) -> Self {
        Self::CorruptRow {
            entity,
            reason: reason.to_string(),
        }
    }

    /// Whether this is a `NotFound`
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::QueryError {
            context: err.to_string(),
        }
    }
}
