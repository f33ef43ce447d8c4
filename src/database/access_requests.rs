// ABOUTME: SQLite implementation of the access request store
// ABOUTME: Status transitions are compare-and-swap updates on the expected prior status
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::{AccessRequest, AccessRequestRole, AccessRequestStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    decode_enum, decode_opt_time, decode_time, encode_opt_time, encode_time, AccessRequestStore,
    Database, DatabaseError, DatabaseResult,
};
use crate::pagination::{Page, PageRequest};

const ENTITY: &str = "access request";

const COLUMNS: &str = "id, requester_user_id, owner_user_id, agent_id, scope, status, \
                       request_note, reviewer_user_id, review_note, revoke_note, created_at, \
                       updated_at, reviewed_at, revoked_at";

fn row_to_request(row: &SqliteRow) -> DatabaseResult<AccessRequest> {
    Ok(AccessRequest {
        id: row.try_get("id")?,
        requester_user_id: row.try_get("requester_user_id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        agent_id: row.try_get("agent_id")?,
        scope: decode_enum(ENTITY, row.try_get("scope")?)?,
        status: decode_enum(ENTITY, row.try_get("status")?)?,
        request_note: row.try_get("request_note")?,
        reviewer_user_id: row.try_get("reviewer_user_id")?,
        review_note: row.try_get("review_note")?,
        revoke_note: row.try_get("revoke_note")?,
        created_at: decode_time(ENTITY, row.try_get("created_at")?)?,
        updated_at: decode_time(ENTITY, row.try_get("updated_at")?)?,
        reviewed_at: decode_opt_time(ENTITY, row.try_get("reviewed_at")?)?,
        revoked_at: decode_opt_time(ENTITY, row.try_get("revoked_at")?)?,
    })
}

#[async_trait]
impl AccessRequestStore for Database {
    async fn insert(&self, request: &AccessRequest) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO access_requests (id, requester_user_id, owner_user_id, agent_id, scope,
                                         status, request_note, reviewer_user_id, review_note,
                                         revoke_note, created_at, updated_at, reviewed_at,
                                         revoked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ",
        )
        .bind(&request.id)
        .bind(&request.requester_user_id)
        .bind(&request.owner_user_id)
        .bind(&request.agent_id)
        .bind(request.scope.as_str())
        .bind(request.status.as_str())
        .bind(&request.request_note)
        .bind(&request.reviewer_user_id)
        .bind(&request.review_note)
        .bind(&request.revoke_note)
        .bind(encode_time(request.created_at))
        .bind(encode_time(request.updated_at))
        .bind(encode_opt_time(request.reviewed_at))
        .bind(encode_opt_time(request.revoked_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<AccessRequest, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM access_requests WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map_or_else(
            || Err(DatabaseError::not_found(ENTITY, id)),
            |row| row_to_request(&row),
        )
    }

    async fn list(
        &self,
        user_id: &str,
        role: AccessRequestRole,
        page: &PageRequest,
    ) -> Result<Page<AccessRequest>, DatabaseError> {
        let party_column = match role {
            AccessRequestRole::Requester => "requester_user_id",
            AccessRequestRole::Owner => "owner_user_id",
        };
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM access_requests
             WHERE {party_column} = ?1 AND (?2 IS NULL OR id > ?2)
             ORDER BY id ASC LIMIT ?3"
        ))
        .bind(user_id)
        .bind(page.cursor())
        .bind(page.fetch_limit())
        .fetch_all(self.pool())
        .await?;

        let requests = rows
            .iter()
            .map(row_to_request)
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(Page::from_rows(requests, page, |r| &r.id))
    }

    async fn transition(
        &self,
        updated: &AccessRequest,
        expected: AccessRequestStatus,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r"
            UPDATE access_requests
            SET status = ?1, reviewer_user_id = ?2, review_note = ?3, revoke_note = ?4,
                updated_at = ?5, reviewed_at = ?6, revoked_at = ?7
            WHERE id = ?8 AND owner_user_id = ?9 AND status = ?10
            ",
        )
        .bind(updated.status.as_str())
        .bind(&updated.reviewer_user_id)
        .bind(&updated.review_note)
        .bind(&updated.revoke_note)
        .bind(encode_time(updated.updated_at))
        .bind(encode_opt_time(updated.reviewed_at))
        .bind(encode_opt_time(updated.revoked_at))
        .bind(&updated.id)
        .bind(&updated.owner_user_id)
        .bind(expected.as_str())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            AccessRequestStore::get(self, &updated.id).await?;
            return Err(DatabaseError::conflict(ENTITY, &updated.id, expected.as_str()));
        }
        Ok(())
    }

    async fn find_approved_invoke(
        &self,
        requester_user_id: &str,
        owner_user_id: &str,
        agent_id: &str,
    ) -> Result<Option<AccessRequest>, DatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM access_requests
             WHERE requester_user_id = ?1 AND owner_user_id = ?2 AND agent_id = ?3
               AND scope = 'invoke' AND status = 'approved'
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(requester_user_id)
        .bind(owner_user_id)
        .bind(agent_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn list_approved_invoke_for_requester(
        &self,
        requester_user_id: &str,
    ) -> Result<Vec<AccessRequest>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM access_requests
             WHERE requester_user_id = ?1 AND scope = 'invoke' AND status = 'approved'
             ORDER BY agent_id ASC, id ASC"
        ))
        .bind(requester_user_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_request).collect()
    }
}
