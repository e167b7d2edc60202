use serde::{Deserialize, Serialize};

use super::{ChatMessage, MessageType};

/// 离线通知载荷，由外部推送服务消费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub receiver_id: String,
    pub conversation_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl NotificationPayload {
    pub fn for_recipient(message: &ChatMessage, receiver_id: &str) -> Self {
        Self {
            receiver_id: receiver_id.to_string(),
            conversation_id: message.conversation_id,
            content: message.content.clone(),
            message_type: message.message_type,
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name().map(str::to_string),
        }
    }

    /// 通知事件的分区键
    pub fn partition_key(&self) -> &str {
        &self.receiver_id
    }
}
