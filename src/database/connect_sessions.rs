// ABOUTME: SQLite implementation of the PKCE connect session store
// ABOUTME: Completion is a one-way pending->completed update that also inserts the resulting grant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::{ProviderConnectSession, ProviderGrant};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    decode_enum, decode_list, decode_opt_time, decode_time, encode_list, encode_opt_time,
    encode_time, Database, DatabaseError, DatabaseResult, ProviderConnectSessionStore,
};
use crate::database::provider_grants::insert_grant_query;

const ENTITY: &str = "connect session";

fn row_to_session(row: &SqliteRow) -> DatabaseResult<ProviderConnectSession> {
    Ok(ProviderConnectSession {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        provider: decode_enum(ENTITY, row.try_get("provider")?)?,
        status: decode_enum(ENTITY, row.try_get("status")?)?,
        requested_scopes: decode_list(ENTITY, row.try_get("requested_scopes")?)?,
        state_hash: row.try_get("state_hash")?,
        code_verifier_ciphertext: row.try_get("code_verifier_ciphertext")?,
        created_at: decode_time(ENTITY, row.try_get("created_at")?)?,
        updated_at: decode_time(ENTITY, row.try_get("updated_at")?)?,
        expires_at: decode_time(ENTITY, row.try_get("expires_at")?)?,
        completed_at: decode_opt_time(ENTITY, row.try_get("completed_at")?)?,
    })
}

#[async_trait]
impl ProviderConnectSessionStore for Database {
    async fn insert(&self, session: &ProviderConnectSession) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO provider_connect_sessions (id, owner_user_id, provider, status,
                                                   requested_scopes, state_hash,
                                                   code_verifier_ciphertext, created_at,
                                                   updated_at, expires_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )
        .bind(&session.id)
        .bind(&session.owner_user_id)
        .bind(session.provider.as_str())
        .bind(session.status.as_str())
        .bind(encode_list(&session.requested_scopes)?)
        .bind(&session.state_hash)
        .bind(&session.code_verifier_ciphertext)
        .bind(encode_time(session.created_at))
        .bind(encode_time(session.updated_at))
        .bind(encode_time(session.expires_at))
        .bind(encode_opt_time(session.completed_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        owner_user_id: &str,
        id: &str,
    ) -> Result<ProviderConnectSession, DatabaseError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_user_id, provider, status, requested_scopes, state_hash,
                   code_verifier_ciphertext, created_at, updated_at, expires_at, completed_at
            FROM provider_connect_sessions
            WHERE id = ?1 AND owner_user_id = ?2
            ",
        )
        .bind(id)
        .bind(owner_user_id)
        .fetch_optional(self.pool())
        .await?;

        row.map_or_else(
            || Err(DatabaseError::not_found(ENTITY, id)),
            |row| row_to_session(&row),
        )
    }

    async fn complete(
        &self,
        owner_user_id: &str,
        id: &str,
        grant: &ProviderGrant,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let now = encode_time(now);
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            r"
            UPDATE provider_connect_sessions
            SET status = 'completed', completed_at = ?1, updated_at = ?1
            WHERE id = ?2 AND owner_user_id = ?3 AND status = 'pending' AND expires_at > ?1
            ",
        )
        .bind(&now)
        .bind(id)
        .bind(owner_user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            ProviderConnectSessionStore::get(self, owner_user_id, id).await?;
            return Err(DatabaseError::conflict(ENTITY, id, "pending"));
        }

        insert_grant_query(grant)?.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
