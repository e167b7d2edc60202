//! 配置管理器 - 负责处理不同环境下的配置选择和覆盖
//!
//! - 根据环境变量选择对象存储配置
//! - 加载 config/environments/{env}.toml 并整体合并到基础配置

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml::Value;

use super::{ChatAppConfig, ObjectStoreConfig, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 选择对象存储配置
    ///
    /// 优先级：
    /// 1. 环境变量 CHAT_OBJECT_STORE_PROFILE 指定的配置
    /// 2. 服务配置中指定的配置名
    pub fn select_object_store_config(
        config: &ChatAppConfig,
        profile_name: &str,
    ) -> Option<ObjectStoreConfig> {
        if let Ok(env_profile) = env::var("CHAT_OBJECT_STORE_PROFILE") {
            if let Some(store_config) = config.object_store_profile(&env_profile) {
                return Some(store_config.clone());
            }
        }

        config.object_store_profile(profile_name).cloned()
    }

    /// 当前环境名称（CHAT_ENV，默认 development）
    pub fn get_environment() -> String {
        env::var("CHAT_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 根据环境加载覆盖配置
    pub fn load_environment_config(base_config: &mut ChatAppConfig) -> Result<()> {
        let env = Self::get_environment();
        let env_config_path = format!("config/environments/{}.toml", env);

        if !Path::new(&env_config_path).exists() {
            return Ok(());
        }

        let env_config_content = fs::read_to_string(&env_config_path)
            .with_context(|| format!("unable to read environment config: {}", env_config_path))?;
        let env_config: Value = toml::from_str(&env_config_content)
            .with_context(|| format!("invalid environment config: {}", env_config_path))?;

        Self::apply_overlay(base_config, env_config)
            .with_context(|| format!("failed to apply environment config: {}", env_config_path))
    }

    /// 将覆盖值合并到已解析的配置上
    pub fn apply_overlay(base_config: &mut ChatAppConfig, overlay: Value) -> Result<()> {
        let mut merged =
            Value::try_from(&*base_config).context("unable to serialize base config")?;
        merge_value(&mut merged, overlay);
        *base_config = merged.try_into().context("invalid merged config")?;
        Ok(())
    }
}
