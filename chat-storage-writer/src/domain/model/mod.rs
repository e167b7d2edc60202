//! 持久化领域模型

use chat_core::protocol::MessageType;
use chrono::{DateTime, Utc};

/// 待写入的消息行（不含任何派生字段）
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub sender_id: String,
    pub client_msg_id: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub file_name: Option<String>,
    pub file_id: Option<String>,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// 已读位置更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastReadUpdate {
    pub conversation_id: i64,
    pub user_id: String,
    pub message_id: i64,
}

/// 一条持久化事件对应的存储操作
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOperation {
    Create(NewMessage),
    UpdateLastRead(LastReadUpdate),
    Skip(&'static str),
}

/// 插入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted(i64),
    /// 相同 client_msg_id 已存在
    Duplicate,
}

/// 单条事件的处理结果，决定指标标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    Duplicate,
    Skipped,
    DecodeFailed,
    StoreFailed,
}

impl PersistOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistOutcome::Persisted => "persisted",
            PersistOutcome::Duplicate => "duplicate",
            PersistOutcome::Skipped => "skipped",
            PersistOutcome::DecodeFailed => "decode_failed",
            PersistOutcome::StoreFailed => "store_failed",
        }
    }
}
