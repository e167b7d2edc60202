use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_core::error::InfraResultExt;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::domain::repository::ParticipantCache;

const KEY_PREFIX: &str = "conv_members:";

/// Redis 会话成员缓存：`conv_members:{conversation_id}` 集合，无过期时间
pub struct RedisParticipantCache {
    connection: ConnectionManager,
}

impl RedisParticipantCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .with_context(|| format!("invalid redis url: {redis_url}"))?;
        let connection = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self { connection })
    }

    pub fn cache_key(conversation_id: i64) -> String {
        format!("{KEY_PREFIX}{conversation_id}")
    }
}

#[async_trait]
impl ParticipantCache for RedisParticipantCache {
    async fn get(&self, conversation_id: i64) -> Result<Option<Vec<String>>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn
            .smembers(Self::cache_key(conversation_id))
            .await
            .into_dependency("redis")?;
        // 空集合与不存在的 key 在 Redis 中无法区分，统一视为未命中
        Ok((!members.is_empty()).then_some(members))
    }

    async fn put(&self, conversation_id: i64, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let key = Self::cache_key(conversation_id);
        let mut conn = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore().sadd(&key, members).ignore();
        let _: () = pipe.query_async(&mut conn).await.into_dependency("redis")?;
        Ok(())
    }
}
