//! 服务模块 - 负责依赖注入与服务启动

use anyhow::Result;
use chat_core::config::ChatAppConfig;
use tracing::{error, info};

mod wire;

pub use wire::{ApplicationContext, initialize};

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 运行应用的主入口点
    pub async fn run(app_config: &ChatAppConfig) -> Result<()> {
        let context = initialize(app_config).await?;
        info!("ApplicationBootstrap created successfully");
        Self::run_with_context(context).await
    }

    /// 运行消费循环，Ctrl-C 后停止
    pub async fn run_with_context(context: ApplicationContext) -> Result<()> {
        let result = context.consumer.consume_until(shutdown_signal()).await;
        info!("Storage writer stopped");
        result
    }
}

async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await
}

/// 等待停机信号；信号监听安装失败时保持运行
async fn wait_for_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            error!(error = %err, "Failed to listen for shutdown signal, running until killed");
            std::future::pending::<()>().await
        }
    }
}
