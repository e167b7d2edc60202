use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    File,
    MarkAsRead,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::File => "file",
            MessageType::MarkAsRead => "mark_as_read",
        }
    }

    /// 已读回执需要同步给发送者自己的在线连接
    pub fn includes_sender(&self) -> bool {
        matches!(self, MessageType::MarkAsRead)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 聊天消息（WebSocket 帧 / 持久化事件载荷）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 持久化后分配的 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// 客户端幂等标识
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(deserialize_with = "deserialize_conversation_id")]
    pub conversation_id: i64,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// 仅在投递给在线接收者的副本上由服务端填充
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_message_id: Option<i64>,
}

impl ChatMessage {
    /// 解码入站帧或事件载荷
    ///
    /// 发送方提供的 `file_url` 一律丢弃。
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut message: ChatMessage = serde_json::from_slice(payload)?;
        message.file_url = None;
        if message.created_at.is_some_and(|ts| ts.year() <= 1) {
            message.created_at = None;
        }
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 持久化事件的分区键
    pub fn partition_key(&self) -> String {
        self.conversation_id.to_string()
    }

    /// 非空的文件路径
    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref().filter(|path| !path.is_empty())
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.sender_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn client_msg_id(&self) -> Option<&str> {
        self.client_msg_id.as_deref().filter(|id| !id.is_empty())
    }

    /// 需要生成预签名 URL 的文件消息
    pub fn needs_file_url(&self) -> bool {
        self.message_type == MessageType::File && self.file_path().is_some()
    }

    /// 用于持久化的副本：不携带派生字段
    pub fn without_derived_fields(&self) -> Self {
        let mut copy = self.clone();
        copy.file_url = None;
        copy
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationIdRepr {
    Int(i64),
    Text(String),
}

fn deserialize_conversation_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match ConversationIdRepr::deserialize(deserializer)? {
        ConversationIdRepr::Int(id) => Ok(id),
        ConversationIdRepr::Text(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid conversation_id: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_string_conversation_id_and_drops_file_url() {
        let raw = br#"{
            "type": "file",
            "conversation_id": "42",
            "sender_id": "A",
            "content": "",
            "file_path": "uploads/a.png",
            "file_url": "https://evil.example/a.png"
        }"#;

        let message = ChatMessage::decode(raw).unwrap();
        assert_eq!(message.conversation_id, 42);
        assert_eq!(message.message_type, MessageType::File);
        assert!(message.file_url.is_none());
        assert!(message.needs_file_url());
        assert_eq!(message.partition_key(), "42");
    }

    #[test]
    fn zero_timestamp_is_treated_as_absent() {
        let raw = br#"{"type":"text","conversation_id":1,"sender_id":"A","content":"hi","created_at":"0001-01-01T00:00:00Z"}"#;
        let message = ChatMessage::decode(raw).unwrap();
        assert!(message.created_at.is_none());
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let raw = br#"{"type":"sticker","conversation_id":1,"sender_id":"A"}"#;
        assert!(ChatMessage::decode(raw).is_err());
    }

    #[test]
    fn serialization_omits_empty_optional_fields() {
        let raw = br#"{"type":"mark_as_read","conversation_id":7,"sender_id":"A","last_read_message_id":99}"#;
        let message = ChatMessage::decode(raw).unwrap();
        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "mark_as_read");
        assert_eq!(json["last_read_message_id"], 99);
        assert!(json.get("file_url").is_none());
        assert!(json.get("id").is_none());
        assert!(MessageType::MarkAsRead.includes_sender());
        assert!(!MessageType::Text.includes_sender());
    }
}
