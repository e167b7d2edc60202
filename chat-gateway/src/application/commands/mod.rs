//! Hub 命令定义（Command DTO）

use tokio::sync::oneshot;

use crate::domain::model::{ConnectionHandle, ConnectionKey, DeliveryReport, InboundFrame};

/// 注册连接
#[derive(Debug)]
pub struct RegisterConnectionCommand {
    pub handle: ConnectionHandle,
}

/// 注销连接
#[derive(Debug, Clone)]
pub struct UnregisterConnectionCommand {
    pub key: ConnectionKey,
}

/// 分发入站消息
#[derive(Debug)]
pub struct DispatchMessageCommand {
    pub frame: InboundFrame,
    /// 需要投递结果时携带
    pub reply: Option<oneshot::Sender<Option<DeliveryReport>>>,
}

/// Hub 循环消费的命令
#[derive(Debug)]
pub enum HubCommand {
    Register(RegisterConnectionCommand),
    Unregister(UnregisterConnectionCommand),
    Dispatch(DispatchMessageCommand),
}
