use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::config::StorageWriterConfig;
use crate::domain::model::{LastReadUpdate, NewMessage, StoreOutcome};
use crate::domain::repository::MessageStore;

pub struct PostgresMessageStore {
    pool: Pool<Postgres>,
}

impl PostgresMessageStore {
    pub async fn connect(config: &StorageWriterConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_max_connections)
            .min_connections(config.postgres_min_connections)
            .acquire_timeout(Duration::from_secs(config.postgres_acquire_timeout_seconds))
            .connect(&config.postgres_url)
            .await
            .context("failed to connect to PostgreSQL")?;

        let store = Self { pool };
        if config.init_schema {
            store
                .init_schema()
                .await
                .context("failed to initialize PostgreSQL schema")?;
        }
        Ok(store)
    }

    /// 初始化表结构（如果不存在）
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id BIGSERIAL PRIMARY KEY,
                conversation_id BIGINT NOT NULL,
                sender_id TEXT NOT NULL,
                client_msg_id TEXT,
                type TEXT NOT NULL DEFAULT 'text',
                content TEXT,
                file_name TEXT,
                file_id TEXT,
                file_path TEXT,
                file_type TEXT,
                file_size BIGINT,
                reply_to_id BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
            ON messages(conversation_id, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 幂等键：仅对携带 client_msg_id 的消息生效
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uq_messages_client_msg_id
            ON messages(conversation_id, client_msg_id)
            WHERE client_msg_id IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS participants (
                conversation_id BIGINT NOT NULL,
                user_id TEXT NOT NULL,
                last_read_message_id BIGINT NOT NULL DEFAULT 0,
                joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (conversation_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("PostgreSQL schema initialized");
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn create_message(&self, message: &NewMessage) -> Result<StoreOutcome> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO messages (
                conversation_id, sender_id, client_msg_id, type, content,
                file_name, file_id, file_path, file_type, file_size, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (conversation_id, client_msg_id) WHERE client_msg_id IS NOT NULL
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(message.conversation_id)
        .bind(&message.sender_id)
        .bind(message.client_msg_id.as_deref())
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(message.file_name.as_deref())
        .bind(message.file_id.as_deref())
        .bind(message.file_path.as_deref())
        .bind(message.file_type.as_deref())
        .bind(message.file_size)
        .bind(message.created_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(id) => StoreOutcome::Inserted(id),
            None => StoreOutcome::Duplicate,
        })
    }

    async fn update_last_read(&self, update: &LastReadUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE participants
            SET last_read_message_id = GREATEST(last_read_message_id, $3)
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(update.conversation_id)
        .bind(&update.user_id)
        .bind(update.message_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
