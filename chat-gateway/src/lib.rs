//! 聊天实时投递网关
//!
//! 维护在线连接，将入站消息扇出给在线成员，离线或背压时转为通知事件，
//! 并把每条消息交给持久化事件流。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;

pub use service::ApplicationBootstrap;
