//! Hub：单一协调循环
//!
//! 注册、注销、分发三类命令通过同一个有界通道串行处理，
//! 投递流程中的背压剔除在循环内直接完成，不再回投到命令通道。

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument};

use crate::application::commands::{
    DispatchMessageCommand, HubCommand, RegisterConnectionCommand, UnregisterConnectionCommand,
};
use crate::domain::model::{ConnectionHandle, ConnectionKey, DeliveryReport, InboundFrame};
use crate::domain::service::{ConnectionRegistry, DeliveryDomainService};

/// Hub 句柄，可在各连接任务间克隆
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// 创建 Hub 句柄及其协调循环
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        delivery: Arc<DeliveryDomainService>,
        buffer: usize,
    ) -> (Self, HubLoop) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let hub = Self { commands: tx };
        let hub_loop = HubLoop {
            commands: rx,
            registry,
            delivery,
        };
        (hub, hub_loop)
    }

    pub async fn register(&self, handle: ConnectionHandle) -> Result<()> {
        self.send(HubCommand::Register(RegisterConnectionCommand { handle }))
            .await
    }

    pub async fn unregister(&self, key: ConnectionKey) -> Result<()> {
        self.send(HubCommand::Unregister(UnregisterConnectionCommand { key }))
            .await
    }

    /// 提交入站帧，不等待投递完成
    pub async fn dispatch(&self, frame: InboundFrame) -> Result<()> {
        self.send(HubCommand::Dispatch(DispatchMessageCommand { frame, reply: None }))
            .await
    }

    /// 提交入站帧并等待投递结果
    pub async fn dispatch_and_wait(&self, frame: InboundFrame) -> Result<Option<DeliveryReport>> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Dispatch(DispatchMessageCommand {
            frame,
            reply: Some(tx),
        }))
        .await?;
        rx.await.map_err(|_| anyhow!("hub loop dropped dispatch reply"))
    }

    async fn send(&self, command: HubCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("hub loop is not running"))
    }
}

/// Hub 协调循环
pub struct HubLoop {
    commands: mpsc::Receiver<HubCommand>,
    registry: Arc<ConnectionRegistry>,
    delivery: Arc<DeliveryDomainService>,
}

impl HubLoop {
    /// 运行直到所有 Hub 句柄被释放
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// 运行直到收到停机信号，退出前处理完已入队的命令并关闭全部连接
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Hub loop started");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Hub loop received shutdown signal");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        // 拒绝新命令，已接收的帧仍需发布持久化事件
        self.commands.close();
        let mut drained = 0usize;
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "Hub loop drained pending commands");
        }

        let closed = self.registry.close_all().await;
        info!(closed, "Hub loop stopped");
    }

    #[instrument(skip_all)]
    async fn handle(&self, command: HubCommand) {
        match command {
            HubCommand::Register(RegisterConnectionCommand { handle }) => {
                self.registry.register(handle).await;
            }
            HubCommand::Unregister(UnregisterConnectionCommand { key }) => {
                self.registry.unregister(&key).await;
            }
            HubCommand::Dispatch(DispatchMessageCommand { frame, reply }) => {
                let report = self.delivery.deliver(frame).await;
                if let Some(reply) = reply {
                    if reply.send(report).is_err() {
                        debug!("Dispatch reply receiver dropped");
                    }
                }
            }
        }
    }
}
