//! 持久化写入服务
//!
//! 消费持久化主题，将消息写入关系型存储，处理完成后提交偏移量。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;

pub use service::ApplicationBootstrap;
