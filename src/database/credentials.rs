// ABOUTME: SQLite implementation of the credential store
// ABOUTME: Owner-scoped reads and a status-guarded revoke
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::Credential;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    decode_enum, decode_opt_time, decode_time, encode_opt_time, encode_time, CredentialStore,
    Database, DatabaseError, DatabaseResult,
};
use crate::pagination::{Page, PageRequest};

const ENTITY: &str = "credential";

const COLUMNS: &str = "id, owner_user_id, provider, label, secret_ciphertext, status, \
                       created_at, updated_at, revoked_at";

fn row_to_credential(row: &SqliteRow) -> DatabaseResult<Credential> {
    Ok(Credential {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        provider: decode_enum(ENTITY, row.try_get("provider")?)?,
        label: row.try_get("label")?,
        secret_ciphertext: row.try_get("secret_ciphertext")?,
        status: decode_enum(ENTITY, row.try_get("status")?)?,
        created_at: decode_time(ENTITY, row.try_get("created_at")?)?,
        updated_at: decode_time(ENTITY, row.try_get("updated_at")?)?,
        revoked_at: decode_opt_time(ENTITY, row.try_get("revoked_at")?)?,
    })
}

#[async_trait]
impl CredentialStore for Database {
    async fn insert(&self, credential: &Credential) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO credentials (id, owner_user_id, provider, label, secret_ciphertext,
                                     status, created_at, updated_at, revoked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(&credential.id)
        .bind(&credential.owner_user_id)
        .bind(credential.provider.as_str())
        .bind(&credential.label)
        .bind(&credential.secret_ciphertext)
        .bind(credential.status.as_str())
        .bind(encode_time(credential.created_at))
        .bind(encode_time(credential.updated_at))
        .bind(encode_opt_time(credential.revoked_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, owner_user_id: &str, id: &str) -> Result<Credential, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM credentials WHERE id = ?1 AND owner_user_id = ?2"
        ))
        .bind(id)
        .bind(owner_user_id)
        .fetch_optional(self.pool())
        .await?;

        row.map_or_else(
            || Err(DatabaseError::not_found(ENTITY, id)),
            |row| row_to_credential(&row),
        )
    }

    async fn list(
        &self,
        owner_user_id: &str,
        page: &PageRequest,
    ) -> Result<Page<Credential>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM credentials
             WHERE owner_user_id = ?1 AND (?2 IS NULL OR id > ?2)
             ORDER BY id ASC LIMIT ?3"
        ))
        .bind(owner_user_id)
        .bind(page.cursor())
        .bind(page.fetch_limit())
        .fetch_all(self.pool())
        .await?;

        let credentials = rows
            .iter()
            .map(row_to_credential)
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(Page::from_rows(credentials, page, |c| &c.id))
    }

    async fn revoke(
        &self,
        owner_user_id: &str,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, DatabaseError> {
        let now = encode_time(now);
        let result = sqlx::query(
            r"
            UPDATE credentials
            SET status = 'revoked', revoked_at = ?1, updated_at = ?1
            WHERE id = ?2 AND owner_user_id = ?3 AND status = 'active'
            ",
        )
        .bind(&now)
        .bind(id)
        .bind(owner_user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a lost race from a missing or foreign row
            CredentialStore::get(self, owner_user_id, id).await?;
            return Err(DatabaseError::conflict(ENTITY, id, "active"));
        }
        CredentialStore::get(self, owner_user_id, id).await
    }
}
