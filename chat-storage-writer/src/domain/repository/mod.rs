//! 仓储接口定义（Port）

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::model::{LastReadUpdate, NewMessage, StoreOutcome};

/// 消息关系型存储
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 写入消息；带 client_msg_id 的重复投递返回 `Duplicate`
    async fn create_message(&self, message: &NewMessage) -> Result<StoreOutcome>;

    /// 单调推进已读位置，返回是否有行被更新
    async fn update_last_read(&self, update: &LastReadUpdate) -> Result<bool>;
}
