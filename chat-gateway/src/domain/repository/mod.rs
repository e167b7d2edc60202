//! 仓储接口定义（Port）

use anyhow::Result;
use async_trait::async_trait;
use chat_core::protocol::{ChatMessage, NotificationPayload};

/// 会话成员缓存
#[async_trait]
pub trait ParticipantCache: Send + Sync {
    /// None 表示未命中
    async fn get(&self, conversation_id: i64) -> Result<Option<Vec<String>>>;

    /// 整体替换成员集合
    async fn put(&self, conversation_id: i64, members: &[String]) -> Result<()>;
}

/// 会话成员的权威数据源（关系型存储）
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn list_participants(&self, conversation_id: i64) -> Result<Vec<String>>;
}

/// 事件总线发布端
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, partition_key: &str, payload: Vec<u8>) -> Result<()>;

    /// 持久化事件，按 conversation_id 分区
    async fn publish_persistence(&self, topic: &str, message: &ChatMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish(topic, &message.partition_key(), payload).await
    }

    /// 离线通知事件，按接收者分区
    async fn publish_notification(
        &self,
        topic: &str,
        notification: &NotificationPayload,
    ) -> Result<()> {
        let payload = serde_json::to_vec(notification)?;
        self.publish(topic, notification.partition_key(), payload).await
    }
}

/// 文件访问 URL 签名
#[async_trait]
pub trait FileUrlSigner: Send + Sync {
    async fn presigned_url(&self, object_path: &str) -> Result<String>;
}
