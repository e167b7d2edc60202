//! 服务模块 - 负责依赖注入与服务启动

use anyhow::{Context, Result};
use chat_core::config::ChatAppConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::interface::router;

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

    /// 启动 HTTP 服务与 Hub 循环，Ctrl-C 后优雅停机
    pub async fn run_with_context(context: ApplicationContext) -> Result<()> {
        let ApplicationContext {
            config,
            state,
            hub_loop,
            publisher,
        } = context;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let hub_task = tokio::spawn(hub_loop.run_until(async move {
            let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
        }));

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
        info!(address = %config.listen_addr, "Chat gateway listening");

        let served = axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error");

        // 停止 Hub 循环并关闭全部连接
        shutdown_tx.send_replace(true);
        if let Err(err) = hub_task.await {
            error!(error = %err, "Hub loop task panicked");
        }

        if let Err(err) = publisher.shutdown().await {
            error!(error = ?err, "Failed to flush pending events on shutdown");
        }

        info!("Chat gateway stopped");
        served
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
