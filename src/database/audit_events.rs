// ABOUTME: SQLite implementation of the append-only audit event store
// ABOUTME: Listing always filters by owner first; optional filters only narrow within that scope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::{AuditEventFilter, AuditEventRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    decode_enum, decode_time, encode_opt_time, encode_time, AuditEventStore, Database,
    DatabaseError, DatabaseResult,
};
use crate::pagination::{Page, PageRequest};

const ENTITY: &str = "audit event";

fn row_to_event(row: &SqliteRow) -> DatabaseResult<AuditEventRecord> {
    Ok(AuditEventRecord {
        id: row.try_get("id")?,
        event_name: decode_enum(ENTITY, row.try_get("event_name")?)?,
        actor_user_id: row.try_get("actor_user_id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        requester_user_id: row.try_get("requester_user_id")?,
        agent_id: row.try_get("agent_id")?,
        access_request_id: row.try_get("access_request_id")?,
        resource: row.try_get("resource")?,
        outcome: decode_enum(ENTITY, row.try_get("outcome")?)?,
        created_at: decode_time(ENTITY, row.try_get("created_at")?)?,
    })
}

#[async_trait]
impl AuditEventStore for Database {
    async fn append(&self, event: &AuditEventRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO audit_events (id, event_name, actor_user_id, owner_user_id,
                                      requester_user_id, agent_id, access_request_id, resource,
                                      outcome, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(&event.id)
        .bind(event.event_name.as_str())
        .bind(&event.actor_user_id)
        .bind(&event.owner_user_id)
        .bind(&event.requester_user_id)
        .bind(&event.agent_id)
        .bind(&event.access_request_id)
        .bind(&event.resource)
        .bind(event.outcome.as_str())
        .bind(encode_time(event.created_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &AuditEventFilter,
        page: &PageRequest,
    ) -> Result<Page<AuditEventRecord>, DatabaseError> {
        let rows = sqlx::query(
            r"
            SELECT id, event_name, actor_user_id, owner_user_id, requester_user_id, agent_id,
                   access_request_id, resource, outcome, created_at
            FROM audit_events
            WHERE owner_user_id = ?1
              AND (?2 IS NULL OR event_name = ?2)
              AND (?3 IS NULL OR agent_id = ?3)
              AND (?4 IS NULL OR created_at >= ?4)
              AND (?5 IS NULL OR created_at <= ?5)
              AND (?6 IS NULL OR id > ?6)
            ORDER BY id ASC
            LIMIT ?7
            ",
        )
        .bind(&filter.owner_user_id)
        .bind(filter.event_name.map(|name| name.as_str()))
        .bind(filter.agent_id.as_deref())
        .bind(encode_opt_time(filter.created_after))
        .bind(encode_opt_time(filter.created_before))
        .bind(page.cursor())
        .bind(page.fetch_limit())
        .fetch_all(self.pool())
        .await?;

        let events = rows
            .iter()
            .map(row_to_event)
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(Page::from_rows(events, page, |e| &e.id))
    }
}
