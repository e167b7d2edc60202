// 测试夹具：各端口的内存实现
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chat_core::metrics::GatewayMetrics;
use chat_gateway::application::{Hub, HubLoop};
use chat_gateway::domain::model::{
    AuthenticatedUser, CloseSignal, ConnectionHandle, ConnectionKey, OutboundFrame,
};
use chat_gateway::domain::repository::{
    EventPublisher, FileUrlSigner, ParticipantCache, ParticipantDirectory,
};
use chat_gateway::domain::service::{
    ConnectionRegistry, DeliveryDomainService, DeliveryTopics, ParticipantResolver,
};
use tokio::sync::{Mutex, mpsc};

pub const PERSISTENCE_TOPIC: &str = "chat.persistence";
pub const NOTIFICATION_TOPIC: &str = "chat.notifications";

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<i64, Vec<String>>>,
}

impl MemoryCache {
    pub async fn members(&self, conversation_id: i64) -> Option<Vec<String>> {
        self.entries.lock().await.get(&conversation_id).cloned()
    }
}

#[async_trait]
impl ParticipantCache for MemoryCache {
    async fn get(&self, conversation_id: i64) -> Result<Option<Vec<String>>> {
        Ok(self.entries.lock().await.get(&conversation_id).cloned())
    }

    async fn put(&self, conversation_id: i64, members: &[String]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(conversation_id, members.to_vec());
        Ok(())
    }
}

/// 记录查询次数的成员数据源
#[derive(Default)]
pub struct CountingDirectory {
    members: HashMap<i64, Vec<String>>,
    pub queries: AtomicUsize,
}

impl CountingDirectory {
    pub fn with(conversation_id: i64, members: &[&str]) -> Self {
        let mut map = HashMap::new();
        map.insert(
            conversation_id,
            members.iter().map(|m| m.to_string()).collect(),
        );
        Self {
            members: map,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParticipantDirectory for CountingDirectory {
    async fn list_participants(&self, conversation_id: i64) -> Result<Vec<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .members
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

/// 记录所有发布事件的事件总线
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
    pub failing: AtomicBool,
}

impl RecordingPublisher {
    pub async fn events(&self, topic: &str) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.topic == topic)
            .cloned()
            .collect()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, partition_key: &str, payload: Vec<u8>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("broker unavailable"));
        }
        self.events.lock().await.push(PublishedEvent {
            topic: topic.to_string(),
            key: partition_key.to_string(),
            payload: serde_json::from_slice(&payload)?,
        });
        Ok(())
    }
}

pub struct StaticSigner;

#[async_trait]
impl FileUrlSigner for StaticSigner {
    async fn presigned_url(&self, object_path: &str) -> Result<String> {
        Ok(format!("https://files.example/{object_path}?signature=test"))
    }
}

/// 组装好的投递环境
pub struct Harness {
    pub hub: Hub,
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<MemoryCache>,
    pub directory: Arc<CountingDirectory>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new(directory: CountingDirectory) -> Self {
        Self::build(directory, Some(Arc::new(StaticSigner)))
    }

    pub fn build(directory: CountingDirectory, signer: Option<Arc<dyn FileUrlSigner>>) -> Self {
        let (harness, hub_loop) = Self::assemble(directory, signer);
        tokio::spawn(hub_loop.run());
        harness
    }

    /// 协调循环不启动，由调用方控制
    pub fn paused(directory: CountingDirectory) -> (Self, HubLoop) {
        Self::assemble(directory, Some(Arc::new(StaticSigner)))
    }

    fn assemble(
        directory: CountingDirectory,
        signer: Option<Arc<dyn FileUrlSigner>>,
    ) -> (Self, HubLoop) {
        let metrics = Arc::new(GatewayMetrics::new());
        let cache = Arc::new(MemoryCache::default());
        let directory = Arc::new(directory);
        let publisher = Arc::new(RecordingPublisher::default());

        let registry = Arc::new(ConnectionRegistry::new(metrics.clone()));
        let resolver = Arc::new(ParticipantResolver::new(
            cache.clone(),
            directory.clone(),
            metrics.clone(),
        ));
        let delivery = Arc::new(DeliveryDomainService::new(
            registry.clone(),
            resolver,
            publisher.clone(),
            signer,
            DeliveryTopics {
                persistence: PERSISTENCE_TOPIC.to_string(),
                notification: NOTIFICATION_TOPIC.to_string(),
            },
            metrics,
        ));

        let (hub, hub_loop) = Hub::new(registry.clone(), delivery, 64);

        let harness = Self {
            hub,
            registry,
            cache,
            directory,
            publisher,
        };
        (harness, hub_loop)
    }

    /// 注册一个在线连接，返回其标识与接收端
    pub async fn connect(
        &self,
        user_id: &str,
        capacity: usize,
    ) -> Result<(ConnectionKey, mpsc::Receiver<OutboundFrame>, CloseSignal)> {
        let key = ConnectionKey::new(user_id);
        let (tx, rx) = mpsc::channel(capacity);
        let close_signal = CloseSignal::new();
        let handle = ConnectionHandle::new(key.clone(), user_id, tx, close_signal.clone());
        self.hub.register(handle).await?;
        Ok((key, rx, close_signal))
    }
}

pub fn user(user_id: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: user_id.to_string(),
        display_name: format!("User {user_id}"),
    }
}

pub fn parse_frame(frame: &OutboundFrame) -> serde_json::Value {
    serde_json::from_str(frame).expect("outbound frame is json")
}
