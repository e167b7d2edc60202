//! 持久化事件到存储操作的映射

use chat_core::protocol::{ChatMessage, MessageType};
use chrono::Utc;

use crate::domain::model::{LastReadUpdate, NewMessage, PersistOperation};

/// 将解码后的事件映射为存储操作
///
/// `file_url` 不会进入存储行。
pub fn plan_operation(message: ChatMessage) -> PersistOperation {
    if message.conversation_id <= 0 {
        return PersistOperation::Skip("invalid conversation_id");
    }
    if message.sender_id.is_empty() {
        return PersistOperation::Skip("missing sender_id");
    }

    match message.message_type {
        MessageType::MarkAsRead => match message.last_read_message_id {
            Some(message_id) if message_id > 0 => {
                PersistOperation::UpdateLastRead(LastReadUpdate {
                    conversation_id: message.conversation_id,
                    user_id: message.sender_id,
                    message_id,
                })
            }
            _ => PersistOperation::Skip("invalid last_read_message_id"),
        },
        MessageType::Text | MessageType::File => {
            let client_msg_id = message.client_msg_id().map(str::to_string);
            let is_file = message.message_type == MessageType::File;
            PersistOperation::Create(NewMessage {
                conversation_id: message.conversation_id,
                sender_id: message.sender_id,
                client_msg_id,
                message_type: message.message_type,
                content: message.content,
                file_name: message.file_name.filter(|_| is_file),
                file_id: message.file_id.filter(|_| is_file),
                file_path: message.file_path.filter(|_| is_file),
                file_type: message.file_type.filter(|_| is_file),
                file_size: message.file_size.filter(|_| is_file),
                created_at: message.created_at.unwrap_or_else(Utc::now),
            })
        }
    }
}
