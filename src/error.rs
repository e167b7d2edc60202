//! Chat Core 错误工具模块
//!
//! - 统一对外暴露投递链路的错误分类（传输 / 依赖 / 解码 / 发布）
//! - 为基础设施层提供便捷的错误转换工具

use thiserror::Error;

/// 投递核心统一错误类型
#[derive(Debug, Error)]
pub enum ChatError {
    /// 入站帧或事件载荷无法解析
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// 外部依赖（Redis / PostgreSQL / Kafka / 对象存储）不可用
    #[error("{component} unavailable: {source}")]
    Dependency {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// 事件总线缓冲区已满
    #[error("event bus buffer is full, topic={topic}")]
    PublishBufferFull { topic: String },

    /// 事件总线已停机
    #[error("event bus is closed")]
    PublishClosed,

    /// 认证失败
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 配置错误
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    pub fn dependency(component: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Dependency {
            component,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// 基础设施结果扩展：将任意错误映射为带组件名的依赖错误
pub trait InfraResultExt<T> {
    fn into_dependency(self, component: &'static str) -> Result<T>;
}

impl<T, E> InfraResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn into_dependency(self, component: &'static str) -> Result<T> {
        self.map_err(|err| ChatError::dependency(component, err))
    }
}
