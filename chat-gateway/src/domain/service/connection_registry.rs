//! 在线连接注册表
//!
//! user_id -> 当前连接。写操作只由 Hub 循环执行，读写锁保证外部查询
//! 不会看到中间状态。

use std::collections::HashMap;
use std::sync::Arc;

use chat_core::metrics::GatewayMetrics;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::model::{ConnectionHandle, ConnectionKey, EnqueueOutcome, OutboundFrame};

pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
    metrics: Arc<GatewayMetrics>,
}

impl ConnectionRegistry {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            metrics,
        }
    }

    /// 注册连接，同一用户的旧连接被覆盖并关闭
    ///
    /// 返回被顶替的连接标识。
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionKey> {
        let key = handle.key.clone();
        let superseded = {
            let mut connections = self.connections.write().await;
            connections.insert(key.user_id.clone(), handle)
        };

        match superseded {
            Some(old) => {
                old.close();
                info!(
                    user_id = %key.user_id,
                    connection_id = %key.connection_id,
                    superseded = %old.key.connection_id,
                    "User reconnected, superseded connection closed"
                );
                Some(old.key)
            }
            None => {
                self.metrics.online_connections.inc();
                info!(
                    user_id = %key.user_id,
                    connection_id = %key.connection_id,
                    "User connected"
                );
                None
            }
        }
    }

    /// 注销连接（仅当注册表中仍是同一连接时才移除）
    ///
    /// 幂等：重复注销或注销已被顶替的连接均为空操作。
    pub async fn unregister(&self, key: &ConnectionKey) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            match connections.get(&key.user_id) {
                Some(current) if current.key.connection_id == key.connection_id => {
                    connections.remove(&key.user_id)
                }
                _ => None,
            }
        };

        match removed {
            Some(handle) => {
                // 句柄在此处释放，发送队列随之关闭
                handle.close();
                self.metrics.online_connections.dec();
                info!(
                    user_id = %key.user_id,
                    connection_id = %key.connection_id,
                    "User disconnected"
                );
                true
            }
            None => {
                debug!(connection = %key, "Unregister ignored, connection not current");
                false
            }
        }
    }

    /// 向用户当前连接非阻塞入队
    pub async fn try_enqueue(&self, user_id: &str, frame: OutboundFrame) -> EnqueueOutcome {
        let connections = self.connections.read().await;
        match connections.get(user_id) {
            Some(handle) => handle.try_enqueue(frame),
            None => EnqueueOutcome::Offline,
        }
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    pub async fn current_connection(&self, user_id: &str) -> Option<ConnectionKey> {
        self.connections
            .read()
            .await
            .get(user_id)
            .map(|handle| handle.key.clone())
    }

    pub async fn online_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// 关闭全部连接（停机时调用）
    pub async fn close_all(&self) -> usize {
        let drained: Vec<ConnectionHandle> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            handle.close();
        }
        self.metrics.online_connections.sub(drained.len() as i64);
        drained.len()
    }
}
