// ABOUTME: SQLite persistence for the broker with embedded migrations
// ABOUTME: One Database type implements every store interface; rows map through shared codecs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

/// Access request store implementation
pub mod access_requests;
/// Agent store implementation
pub mod agents;
/// Audit event store implementation
pub mod audit_events;
/// Connect session store implementation
pub mod connect_sessions;
/// Credential store implementation
pub mod credentials;
/// Database error types
pub mod errors;
/// Provider grant store implementation
pub mod provider_grants;
/// Store trait definitions
pub mod repositories;

pub use errors::{DatabaseError, DatabaseResult};
pub use repositories::{
    AccessRequestStore, AgentStore, AuditEventStore, CredentialStore, ProviderConnectSessionStore,
    ProviderGrantFilter, ProviderGrantStore, RefreshedTokens,
};

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::errors::{AppError, AppResult};

/// `SQLite` connection pool
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect, creating the file if needed, and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database URL is invalid or malformed
    /// - Database connection fails
    /// - Migration process fails
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives exactly as long as its single connection
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Fresh in-memory database, migrated
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail
    pub async fn in_memory() -> AppResult<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run all pending migrations embedded at compile time
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails
    pub async fn migrate(&self) -> AppResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;
        info!("Database migrations completed successfully");
        Ok(())
    }
}

/// RFC 3339 UTC with microseconds; lexical order equals time order
pub(crate) fn encode_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode_opt_time(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(encode_time)
}

pub(crate) fn decode_time(entity: &'static str, value: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::corrupt(entity, format!("bad timestamp {value:?}: {e}")))
}

pub(crate) fn decode_opt_time(
    entity: &'static str,
    value: Option<String>,
) -> DatabaseResult<Option<DateTime<Utc>>> {
    value.as_deref().map(|v| decode_time(entity, v)).transpose()
}

pub(crate) fn encode_list(values: &[String]) -> DatabaseResult<String> {
    serde_json::to_string(values).map_err(|e| DatabaseError::QueryError {
        context: format!("Failed to encode list: {e}"),
    })
}

pub(crate) fn decode_list(entity: &'static str, value: &str) -> DatabaseResult<Vec<String>> {
    serde_json::from_str(value).map_err(|e| DatabaseError::corrupt(entity, e))
}

/// Parse a stored enum column through its `FromStr`
pub(crate) fn decode_enum<T>(entity: &'static str, value: &str) -> DatabaseResult<T>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .parse()
        .map_err(|e: T::Err| DatabaseError::corrupt(entity, e.to_string()))
}
