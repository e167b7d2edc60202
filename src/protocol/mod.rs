//! 实时通道与事件总线共享的消息协议
//!
//! - `ChatMessage`：WebSocket 帧与持久化事件的 JSON 载荷
//! - `NotificationPayload`：离线通知事件的精简载荷

mod message;
mod notification;

pub use message::{ChatMessage, MessageType};
pub use notification::NotificationPayload;
