//! # 日志初始化模块
//!
//! 为各个服务提供统一的 tracing 日志初始化。

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// 从配置初始化日志系统
///
/// RUST_LOG 优先；未设置时使用配置中的级别，缺省为 debug。
///
/// ```rust,ignore
/// use chat_core::config::load_config;
/// use chat_core::tracing::init_tracing_from_config;
///
/// let cfg = load_config(None);
/// init_tracing_from_config(Some(&cfg.logging));
/// ```
pub fn init_tracing_from_config(logging_config: Option<&LoggingConfig>) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level_str = logging_config.map(|c| c.level.as_str()).unwrap_or("debug");
            EnvFilter::new(level_str)
        }
    };

    let default_config = LoggingConfig::default();
    let config = logging_config.unwrap_or(&default_config);

    let builder = fmt::Subscriber::builder()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_env_filter(env_filter);

    // 重复初始化（例如测试中）时忽略错误
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(err) = result {
        ::tracing::debug!(error = %err, "tracing subscriber already initialized");
    }
}
