//! 领域模型：连接、入站帧与投递结果

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// 经认证的用户身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub display_name: String,
}

/// 连接标识：同一用户的不同连接以 connection_id 区分
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub user_id: String,
    pub connection_id: Uuid,
}

impl ConnectionKey {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.user_id, self.connection_id)
    }
}

/// 已序列化的出站帧，多个接收者共享同一份内容
pub type OutboundFrame = Arc<str>;

/// 连接关闭信号，读写两端共享
#[derive(Debug, Clone)]
pub struct CloseSignal {
    inner: Arc<watch::Sender<bool>>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { inner: Arc::new(tx) }
    }

    /// 触发关闭（可重复调用）
    pub fn close(&self) {
        self.inner.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.subscribe()
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 注册表中保存的连接句柄
///
/// 发送队列的唯一 Sender 归注册表所有，句柄被移除即视为队列关闭。
#[derive(Debug)]
pub struct ConnectionHandle {
    pub key: ConnectionKey,
    pub display_name: String,
    outbox: mpsc::Sender<OutboundFrame>,
    close_signal: CloseSignal,
}

impl ConnectionHandle {
    pub fn new(
        key: ConnectionKey,
        display_name: impl Into<String>,
        outbox: mpsc::Sender<OutboundFrame>,
        close_signal: CloseSignal,
    ) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            outbox,
            close_signal,
        }
    }

    /// 非阻塞入队
    pub fn try_enqueue(&self, frame: OutboundFrame) -> EnqueueOutcome {
        match self.outbox.try_send(frame) {
            Ok(()) => EnqueueOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::Stalled(self.key.clone()),
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed(self.key.clone()),
        }
    }

    /// 通知读写任务退出
    pub fn close(&self) {
        self.close_signal.close();
    }
}

/// 单个接收者的入队结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Delivered,
    /// 发送队列已满（背压）
    Stalled(ConnectionKey),
    /// 写任务已退出
    Closed(ConnectionKey),
    Offline,
}

/// 入站帧：原始字节 + 认证身份
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub origin: Option<AuthenticatedUser>,
    pub payload: Vec<u8>,
}

impl InboundFrame {
    pub fn from_user(origin: AuthenticatedUser, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            origin: Some(origin),
            payload: payload.into(),
        }
    }
}

/// 一次投递流程的结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub conversation_id: i64,
    /// 成功写入在线连接队列的接收者数
    pub delivered: usize,
    /// 已发布离线通知的接收者数
    pub notified: usize,
    /// 因背压或队列关闭被剔除的连接数
    pub evicted: usize,
    pub persistence_published: bool,
}
