//! Chat Core 公共库
//!
//! 提供统一的配置加载、日志初始化、指标、错误类型与消息协议

pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod tracing;

pub use config::{
    ChatAppConfig, ConfigManager, GatewayServiceConfig, KafkaClusterConfig, LoggingConfig,
    ObjectStoreConfig, PostgresInstanceConfig, RedisPoolConfig, ServiceEndpointConfig,
    ServiceRuntimeConfig, StorageWriterServiceConfig, load_config,
};
pub use error::{ChatError, InfraResultExt, Result};
pub use protocol::{ChatMessage, MessageType, NotificationPayload};
