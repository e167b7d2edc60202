//! Chat Core 配置模块
//!
//! 该模块提供了完整的应用程序配置管理功能，包括：
//! - 配置文件加载和解析（单文件或目录片段合并）
//! - 环境特定配置覆盖
//! - Redis、Kafka、PostgreSQL、对象存储等基础设施配置
//! - 网关与存储写入服务配置

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::warn;

mod manager;
pub use manager::ConfigManager;

/// 全局应用配置实例，使用 OnceLock 确保只初始化一次
static APP_CONFIG: OnceLock<ChatAppConfig> = OnceLock::new();

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub with_target: bool,
    #[serde(default)]
    pub with_thread_ids: bool,
    #[serde(default)]
    pub with_file: bool,
    #[serde(default)]
    pub with_line_number: bool,
    /// 以 JSON 格式输出
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Redis 连接配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RedisPoolConfig {
    /// Redis 服务器地址
    pub url: String,
    /// 数据库编号
    #[serde(default)]
    pub database: Option<u32>,
}

/// Kafka 集群配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KafkaClusterConfig {
    /// Kafka 服务器地址列表
    pub bootstrap_servers: String,
    /// 客户端标识
    #[serde(default)]
    pub client_id: Option<String>,
    /// 超时时间（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// 其他 librdkafka 选项
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// PostgreSQL 数据库实例配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostgresInstanceConfig {
    /// 数据库连接 URL
    pub url: String,
    /// 最大连接数
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// 最小连接数
    #[serde(default)]
    pub min_connections: Option<u32>,
}

/// 对象存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectStoreConfig {
    /// 存储类型（如 minio, s3）
    pub profile_type: String,
    /// 存储服务端点
    #[serde(default)]
    pub endpoint: Option<String>,
    /// 访问密钥
    #[serde(default)]
    pub access_key: Option<String>,
    /// 秘密密钥
    #[serde(default)]
    pub secret_key: Option<String>,
    /// 存储桶名称
    #[serde(default)]
    pub bucket: Option<String>,
    /// 区域
    #[serde(default)]
    pub region: Option<String>,
    /// 是否使用 path-style 访问（MinIO 需要）
    #[serde(default)]
    pub force_path_style: Option<bool>,
    /// 预签名 URL 过期时间（秒）
    #[serde(default)]
    pub presign_url_ttl_seconds: Option<u64>,
}

/// 服务端点配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceEndpointConfig {
    /// 服务地址
    pub address: Option<String>,
    /// 服务端口
    pub port: Option<u16>,
}

/// 服务运行时配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceRuntimeConfig {
    /// 服务名称
    #[serde(default)]
    pub service_name: Option<String>,
    /// 服务器配置
    #[serde(default)]
    pub server: Option<ServiceEndpointConfig>,
}

/// 实时投递网关服务配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayServiceConfig {
    /// 运行时配置
    #[serde(flatten)]
    pub runtime: ServiceRuntimeConfig,
    /// Kafka 配置名
    #[serde(default)]
    pub kafka: Option<String>,
    /// 持久化主题
    #[serde(default)]
    pub persistence_topic: Option<String>,
    /// 离线通知主题
    #[serde(default)]
    pub notification_topic: Option<String>,
    /// 参与者缓存（Redis 配置名）
    #[serde(default)]
    pub participant_cache: Option<String>,
    /// 关系型存储（PostgreSQL 配置名）
    #[serde(default)]
    pub postgres: Option<String>,
    /// 对象存储配置名
    #[serde(default)]
    pub object_store: Option<String>,
    /// JWT 密钥
    #[serde(default)]
    pub token_secret: Option<String>,
    /// 每连接发送队列容量
    #[serde(default)]
    pub outbound_queue_capacity: Option<usize>,
    /// 心跳间隔（秒）
    #[serde(default)]
    pub ping_interval_seconds: Option<u64>,
    /// 心跳超时（秒）
    #[serde(default)]
    pub pong_wait_seconds: Option<u64>,
}

/// 存储写入服务配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageWriterServiceConfig {
    /// 运行时配置
    #[serde(flatten)]
    pub runtime: ServiceRuntimeConfig,
    /// Kafka 配置名
    #[serde(default)]
    pub kafka: Option<String>,
    /// 持久化主题
    #[serde(default)]
    pub kafka_topic: Option<String>,
    /// 消费者组
    #[serde(default)]
    pub consumer_group: Option<String>,
    /// PostgreSQL 配置名
    #[serde(default)]
    pub postgres: Option<String>,
}

/// 服务配置集合
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub gateway: Option<GatewayServiceConfig>,
    #[serde(default)]
    pub storage_writer: Option<StorageWriterServiceConfig>,
}

/// 应用配置主结构体
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatAppConfig {
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis 配置映射
    #[serde(default)]
    pub redis: HashMap<String, RedisPoolConfig>,
    /// Kafka 配置映射
    #[serde(default)]
    pub kafka: HashMap<String, KafkaClusterConfig>,
    /// PostgreSQL 配置映射
    #[serde(default)]
    pub postgres: HashMap<String, PostgresInstanceConfig>,
    /// 对象存储配置映射
    #[serde(default)]
    pub object_storage: HashMap<String, ObjectStoreConfig>,
    /// 服务配置
    #[serde(default)]
    pub services: ServicesConfig,
}

impl ChatAppConfig {
    /// 获取 Redis 配置
    pub fn redis_profile(&self, name: &str) -> Option<&RedisPoolConfig> {
        self.redis.get(name)
    }

    /// 获取 Kafka 配置
    pub fn kafka_profile(&self, name: &str) -> Option<&KafkaClusterConfig> {
        self.kafka.get(name)
    }

    /// 获取 PostgreSQL 配置
    pub fn postgres_profile(&self, name: &str) -> Option<&PostgresInstanceConfig> {
        self.postgres.get(name)
    }

    /// 获取对象存储配置
    pub fn object_store_profile(&self, name: &str) -> Option<&ObjectStoreConfig> {
        self.object_storage.get(name)
    }

    /// 获取网关服务配置
    pub fn gateway_service(&self) -> GatewayServiceConfig {
        self.services.gateway.clone().unwrap_or_default()
    }

    /// 获取存储写入服务配置
    pub fn storage_writer_service(&self) -> StorageWriterServiceConfig {
        self.services.storage_writer.clone().unwrap_or_default()
    }

    /// 解析服务监听地址
    pub fn listen_address(runtime: &ServiceRuntimeConfig, default_port: u16) -> String {
        let server = runtime.server.clone().unwrap_or_default();
        let address = server
            .address
            .filter(|addr| !addr.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = server.port.filter(|port| *port != 0).unwrap_or(default_port);
        format!("{address}:{port}")
    }
}

/// 加载配置
pub fn load_config(path: Option<&str>) -> &'static ChatAppConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    APP_CONFIG.get_or_init(|| {
        let mut cfg = load_with_fallback(&candidates);
        if let Err(e) = ConfigManager::load_environment_config(&mut cfg) {
            warn!("failed to load environment config: {}", e);
        }
        cfg
    })
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> ChatAppConfig {
    for path in candidates {
        match load_config_from_source(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    ChatAppConfig::default()
}

/// 从源加载配置
pub fn load_config_from_source(path: &Path) -> Result<ChatAppConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

fn load_config_from_file(path: &Path) -> Result<ChatAppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    let cfg: ChatAppConfig = toml::from_str(&content)
        .with_context(|| format!("invalid config format: {}", path.display()))?;
    Ok(cfg)
}

/// 从目录加载配置：base.toml + shared/ + services/ + overrides/
fn load_config_from_directory(path: &Path) -> Result<ChatAppConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("shared"))?;
    merge_directory(&mut merged, &path.join("services"))?;
    merge_directory(&mut merged, &path.join("overrides"))?;

    let cfg: ChatAppConfig = merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))?;

    Ok(cfg)
}

fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 递归合并：表按键合并，其余类型整体覆盖
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
