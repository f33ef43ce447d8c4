// ABOUTME: SQLite implementation of the agent store
// ABOUTME: The credential/grant columns are mutually exclusive and mapped to an AuthReference
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use async_trait::async_trait;
use broker_core::models::{Agent, AuthReference};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    decode_enum, decode_time, encode_time, AgentStore, Database, DatabaseError, DatabaseResult,
};
use crate::pagination::{Page, PageRequest};

const ENTITY: &str = "agent";

const COLUMNS: &str = "id, owner_user_id, name, provider, model, credential_id, \
                       provider_grant_id, status, created_at, updated_at";

fn row_to_agent(row: &SqliteRow) -> DatabaseResult<Agent> {
    let credential_id: Option<String> = row.try_get("credential_id")?;
    let provider_grant_id: Option<String> = row.try_get("provider_grant_id")?;
    let auth = AuthReference::from_parts(credential_id.as_deref(), provider_grant_id.as_deref())
        .map_err(|e| DatabaseError::corrupt(ENTITY, e))?;

    Ok(Agent {
        id: row.try_get("id")?,
        owner_user_id: row.try_get("owner_user_id")?,
        name: row.try_get("name")?,
        provider: decode_enum(ENTITY, row.try_get("provider")?)?,
        model: row.try_get("model")?,
        auth,
        status: decode_enum(ENTITY, row.try_get("status")?)?,
        created_at: decode_time(ENTITY, row.try_get("created_at")?)?,
        updated_at: decode_time(ENTITY, row.try_get("updated_at")?)?,
    })
}

#[async_trait]
impl AgentStore for Database {
    async fn insert(&self, agent: &Agent) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO agents (id, owner_user_id, name, provider, model, credential_id,
                                provider_grant_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(&agent.id)
        .bind(&agent.owner_user_id)
        .bind(&agent.name)
        .bind(agent.provider.as_str())
        .bind(&agent.model)
        .bind(agent.auth.credential_id())
        .bind(agent.auth.provider_grant_id())
        .bind(agent.status.as_str())
        .bind(encode_time(agent.created_at))
        .bind(encode_time(agent.updated_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Agent, DatabaseError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM agents WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map_or_else(
            || Err(DatabaseError::not_found(ENTITY, id)),
            |row| row_to_agent(&row),
        )
    }

    async fn list_owned(
        &self,
        owner_user_id: &str,
        page: &PageRequest,
    ) -> Result<Page<Agent>, DatabaseError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM agents
             WHERE owner_user_id = ?1 AND (?2 IS NULL OR id > ?2)
             ORDER BY id ASC LIMIT ?3"
        ))
        .bind(owner_user_id)
        .bind(page.cursor())
        .bind(page.fetch_limit())
        .fetch_all(self.pool())
        .await?;

        let agents = rows
            .iter()
            .map(row_to_agent)
            .collect::<DatabaseResult<Vec<_>>>()?;
        Ok(Page::from_rows(agents, page, |a| &a.id))
    }

    async fn update(&self, agent: &Agent) -> Result<(), DatabaseError> {
        // Both auth columns are always written so a switch never leaves the old reference behind
        let result = sqlx::query(
            r"
            UPDATE agents
            SET name = ?1, model = ?2, credential_id = ?3, provider_grant_id = ?4, updated_at = ?5
            WHERE id = ?6 AND owner_user_id = ?7
            ",
        )
        .bind(&agent.name)
        .bind(&agent.model)
        .bind(agent.auth.credential_id())
        .bind(agent.auth.provider_grant_id())
        .bind(encode_time(agent.updated_at))
        .bind(&agent.id)
        .bind(&agent.owner_user_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found(ENTITY, &agent.id));
        }
        Ok(())
    }

    async fn delete(&self, owner_user_id: &str, id: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?1 AND owner_user_id = ?2")
            .bind(id)
            .bind(owner_user_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found(ENTITY, id));
        }
        Ok(())
    }
}
