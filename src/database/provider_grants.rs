// ABOUTME: SQLite implementation of the provider grant store
// ABOUTME: Refresh outcomes are compare-and-swap on the tokens read; revoked grants never reactivate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::{ProviderGrant, ProviderGrantStatus};
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

use super::{
    decode_enum, decode_list, decode_opt_time, decode_time, encode_list, encode_opt_time,
    encode_time, Database, DatabaseError, DatabaseResult, ProviderGrantFilter, ProviderGrantStore,
    RefreshedTokens,
};
use crate::pagination::{Page, PageRequest};

const ENTITY: &str = "provider grant";

const COLUMNS: &str = "id, owner_user_id, provider, granted_scopes, token_ciphertext, \
                       refresh_supported, status, last_refresh_error, created_at, updated_at, \
                       revoked_at, expires_at, last_refreshed_at";

fn row_to_grant(row: &SqliteRow) -> DatabaseResult<ProviderGrant> {
    Ok(ProviderGrant {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        provider: decode_enum(ENTITY, row.try_get("provider")?)?,
        granted_scopes: decode_list(ENTITY, row.try_get("granted_scopes")?)?,
        token_ciphertext: row.try_get("token_ciphertext")?,
        refresh_supported: row.try_get("refresh_supported")?,
        status: decode_enum(ENTITY, row.try_get("status")?)?,
        last_refresh_error: row.try_get("last_refresh_error")?,
        created_at: decode_time(ENTITY, row.try_get("created_at")?)?,
        updated_at: decode_time(ENTITY, row.try_get("updated_at")?)?,
        revoked_at: decode_opt_time(ENTITY, row.try_get("revoked_at")?)?,
        expires_at: decode_opt_time(ENTITY, row.try_get("expires_at")?)?,
        last_refreshed_at: decode_opt_time(ENTITY, row.try_get("last_refreshed_at")?)?,
    })
}

impl Database {
    /// Zero affected rows: missing/foreign row is `NotFound`, otherwise the guard lost
    async fn grant_guard_failed(
        &self,
        owner_user_id: &str,
        id: &str,
        expected: &'static str,
    ) -> DatabaseError {
        match ProviderGrantStore::get(self, owner_user_id, id).await {
            Ok(_) => DatabaseError::conflict(ENTITY, id, expected),
            Err(err) => err,
        }
    }
}

/// Grants are only written by connect completion, inside its transaction
pub(super) fn insert_grant_query(
    grant: &ProviderGrant,
) -> DatabaseResult<Query<'_, Sqlite, SqliteArguments<'_>>> {
    Ok(sqlx::query(
        r"
        INSERT INTO provider_grants (id, owner_user_id, provider, granted_scopes,
                                     token_ciphertext, refresh_supported, status,
                                     last_refresh_error, created_at, updated_at,
                                     revoked_at, expires_at, last_refreshed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ",
    )
    .bind(&grant.id)
    .bind(&grant.owner_user_id)
    .bind(grant.provider.as_str())
    .bind(encode_list(&grant.granted_scopes)?)
    .bind(&grant.token_ciphertext)
    .bind(grant.refresh_supported)
    .bind(grant.status.as_str())
    .bind(&grant.last_refresh_error)
    .bind(encode_time(grant.created_at))
    .bind(encode_time(grant.updated_at))
    .bind(encode_opt_time(grant.revoked_at))
    .bind(encode_opt_time(grant.expires_at))
    .bind(encode_opt_time(grant.last_refreshed_at)))
}

#[async_trait]
impl ProviderGrantStore for Database {
    async fn get(&self, owner_user_id: &str, id: &str) -> Result<ProviderGrant, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM provider_grants WHERE id = ?1 AND owner_user_id = ?2"
        ))
        .bind(id)
        .bind(owner_user_id)
        .fetch_optional(self.pool())
        .await?;

        row.map_or_else(
            || Err(DatabaseError::not_found(ENTITY, id)),
            |row| row_to_grant(&row),
        )
    }

    async fn list(
        &self,
        owner_user_id: &str,
        filter: ProviderGrantFilter,
        page: &PageRequest,
    ) -> Result<Page<ProviderGrant>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM provider_grants
             WHERE owner_user_id = ?1
               AND (?2 IS NULL OR provider = ?2)
               AND (?3 IS NULL OR status = ?3)
               AND (?4 IS NULL OR id > ?4)
             ORDER BY id ASC LIMIT ?5"
        ))
        .bind(owner_user_id)
        .bind(filter.provider.map(|p| p.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(page.cursor())
        .bind(page.fetch_limit())
        .fetch_all(self.pool())
        .await?;

        let grants = rows
            .iter()
            .map(row_to_grant)
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(Page::from_rows(grants, page, |g| &g.id))
    }

    async fn record_refresh_success(
        &self,
        read: &ProviderGrant,
        status: ProviderGrantStatus,
        tokens: RefreshedTokens,
        now: DateTime<Utc>,
    ) -> Result<ProviderGrant, DatabaseError> {
        let now = encode_time(now);
        let result = sqlx::query(
            r"
            UPDATE provider_grants
            SET token_ciphertext = ?1, refresh_supported = ?2, expires_at = ?3, status = ?4,
                last_refresh_error = '', last_refreshed_at = ?5, updated_at = ?5
            WHERE id = ?6 AND owner_user_id = ?7 AND status <> 'revoked'
              AND token_ciphertext = ?8
            ",
        )
        .bind(&tokens.token_ciphertext)
        .bind(tokens.refresh_supported)
        .bind(encode_opt_time(tokens.expires_at))
        .bind(status.as_str())
        .bind(&now)
        .bind(&read.id)
        .bind(&read.owner_user_id)
        .bind(&read.token_ciphertext)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .grant_guard_failed(&read.owner_user_id, &read.id, "current")
                .await);
        }
        ProviderGrantStore::get(self, &read.owner_user_id, &read.id).await
    }

    async fn record_refresh_failure(
        &self,
        read: &ProviderGrant,
        status: ProviderGrantStatus,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ProviderGrant, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE provider_grants
            SET status = ?1, last_refresh_error = ?2, updated_at = ?3
            WHERE id = ?4 AND owner_user_id = ?5 AND status <> 'revoked'
              AND token_ciphertext = ?6
            ",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(encode_time(now))
        .bind(&read.id)
        .bind(&read.owner_user_id)
        .bind(&read.token_ciphertext)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .grant_guard_failed(&read.owner_user_id, &read.id, "current")
                .await);
        }
        ProviderGrantStore::get(self, &read.owner_user_id, &read.id).await
    }

    async fn revoke(
        &self,
        owner_user_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProviderGrant, DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE provider_grants
            SET status = 'revoked', revoked_at = ?1, updated_at = ?1
            WHERE id = ?2 AND owner_user_id = ?3 AND status <> 'revoked'
            ",
        )
        .bind(encode_time(now))
        .bind(id)
        .bind(owner_user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.grant_guard_failed(owner_user_id, id, "revocable").await);
        }
        ProviderGrantStore::get(self, owner_user_id, id).await
    }
}
