//! Wire 风格的依赖注入模块

use std::sync::Arc;

use anyhow::{Context, Result};
use chat_core::config::ChatAppConfig;
use chat_core::metrics::StorageWriterMetrics;

use crate::application::PersistenceCommandHandler;
use crate::config::StorageWriterConfig;
use crate::domain::repository::MessageStore;
use crate::infrastructure::persistence::PostgresMessageStore;
use crate::infrastructure::retry::RetryPolicy;
use crate::interface::messaging::StorageWriterConsumer;

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub consumer: StorageWriterConsumer,
}

/// 构建应用上下文
pub async fn initialize(app_config: &ChatAppConfig) -> Result<ApplicationContext> {
    // 1. 加载存储写入器配置
    let config = Arc::new(
        StorageWriterConfig::from_app_config(app_config)
            .context("Failed to load storage writer service configuration")?,
    );

    // 2. 指标
    let metrics = Arc::new(StorageWriterMetrics::new());

    // 3. 关系型存储
    let store: Arc<dyn MessageStore> = Arc::new(
        PostgresMessageStore::connect(&config)
            .await
            .context("Failed to create PostgreSQL message store")?,
    );

    // 4. 命令处理器
    let retry_policy = RetryPolicy::from_config(
        config.retry_max_attempts,
        config.retry_initial_delay_ms,
        config.retry_max_delay_ms,
    );
    let command_handler = Arc::new(PersistenceCommandHandler::new(store, retry_policy, metrics));

    // 5. Kafka 消费者
    let consumer = StorageWriterConsumer::new(config, command_handler)
        .context("Failed to create StorageWriterConsumer")?;

    Ok(ApplicationContext { consumer })
}
