use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_core::error::InfraResultExt;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use std::time::Duration;

use crate::domain::repository::ParticipantDirectory;

/// PostgreSQL 会话成员查询
pub struct PostgresParticipantDirectory {
    pool: Pool<Postgres>,
}

impl PostgresParticipantDirectory {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        // 连接延迟建立，数据库暂不可用时网关仍可启动
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(url)
            .context("invalid postgres url")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ParticipantDirectory for PostgresParticipantDirectory {
    async fn list_participants(&self, conversation_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM participants
            WHERE conversation_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list participants of conversation {conversation_id}"))
        .into_dependency("postgres")?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }
}
