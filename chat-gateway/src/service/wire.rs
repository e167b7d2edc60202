//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建全部组件，单例均通过构造函数注入

use std::sync::Arc;

use anyhow::{Context, Result};
use chat_core::config::ChatAppConfig;
use chat_core::metrics::GatewayMetrics;
use tracing::{info, warn};

use crate::application::{Hub, HubLoop};
use crate::config::GatewayConfig;
use crate::domain::repository::{
    EventPublisher, FileUrlSigner, ParticipantCache, ParticipantDirectory,
};
use crate::domain::service::{
    ConnectionRegistry, DeliveryDomainService, DeliveryTopics, ParticipantResolver,
};
use crate::infrastructure::auth::JwtAuthenticator;
use crate::infrastructure::cache::RedisParticipantCache;
use crate::infrastructure::messaging::KafkaEventPublisher;
use crate::infrastructure::object_store::S3FileUrlSigner;
use crate::infrastructure::persistence::PostgresParticipantDirectory;
use crate::interface::{AppState, ConnectionSettings};

/// 应用上下文 - 包含所有已初始化的服务
pub struct ApplicationContext {
    pub config: Arc<GatewayConfig>,
    pub state: AppState,
    pub hub_loop: HubLoop,
    pub publisher: Arc<KafkaEventPublisher>,
}

/// 构建应用上下文
pub async fn initialize(app_config: &ChatAppConfig) -> Result<ApplicationContext> {
    // 1. 加载网关配置
    let config = Arc::new(
        GatewayConfig::from_app_config(app_config)
            .context("Failed to load gateway service configuration")?,
    );

    // 2. 指标
    let metrics = Arc::new(GatewayMetrics::new());

    // 3. 会话成员缓存与数据源
    let cache: Arc<dyn ParticipantCache> = Arc::new(
        RedisParticipantCache::connect(&config.redis_url)
            .await
            .context("Failed to connect participant cache")?,
    );
    let directory: Arc<dyn ParticipantDirectory> = Arc::new(
        PostgresParticipantDirectory::connect(&config.postgres_url, config.postgres_max_connections)
            .await
            .context("Failed to create participant directory")?,
    );

    // 4. 事件总线
    let publisher = KafkaEventPublisher::new(&config, metrics.clone())
        .context("Failed to create event publisher")?;

    // 5. 对象存储（可选）
    let signer = build_file_url_signer(&config).await;

    // 6. 领域服务
    let registry = Arc::new(ConnectionRegistry::new(metrics.clone()));
    let resolver = Arc::new(ParticipantResolver::new(cache, directory, metrics.clone()));
    let delivery = Arc::new(DeliveryDomainService::new(
        registry.clone(),
        resolver,
        publisher.clone() as Arc<dyn EventPublisher>,
        signer,
        DeliveryTopics {
            persistence: config.persistence_topic.clone(),
            notification: config.notification_topic.clone(),
        },
        metrics,
    ));

    // 7. Hub
    let (hub, hub_loop) = Hub::new(registry, delivery, config.hub_command_buffer);

    let state = AppState {
        hub,
        authenticator: Arc::new(JwtAuthenticator::new(&config.token_secret)),
        connection: ConnectionSettings {
            outbound_queue_capacity: config.outbound_queue_capacity,
            ping_interval: config.ping_interval(),
            pong_wait: config.pong_wait(),
            write_timeout: config.write_timeout(),
        },
        max_message_size: config.max_message_size,
    };

    Ok(ApplicationContext {
        config,
        state,
        hub_loop,
        publisher,
    })
}

async fn build_file_url_signer(config: &GatewayConfig) -> Option<Arc<dyn FileUrlSigner>> {
    let Some(settings) = config.object_store.as_ref() else {
        info!("Object store not configured, file urls will not be signed");
        return None;
    };

    match S3FileUrlSigner::from_settings(settings).await {
        Ok(signer) => Some(Arc::new(signer) as Arc<dyn FileUrlSigner>),
        Err(err) => {
            warn!(error = ?err, "Failed to initialize object store, file urls disabled");
            None
        }
    }
}
