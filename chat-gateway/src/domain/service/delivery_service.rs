//! 投递领域服务
//!
//! 单条入站消息的处理流程：
//! 1. 解码并规范化
//! 2. 无条件发布持久化事件（按 conversation_id 分区）
//! 3. 文件消息生成预签名 URL（仅用于在线副本）
//! 4. cache-aside 解析会话成员
//! 5. 逐个接收者非阻塞入队，背压或离线时发布通知事件

use std::sync::Arc;
use std::time::Instant;

use chat_core::metrics::GatewayMetrics;
use chat_core::protocol::{ChatMessage, NotificationPayload};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::domain::model::{DeliveryReport, EnqueueOutcome, InboundFrame, OutboundFrame};
use crate::domain::repository::{EventPublisher, FileUrlSigner};
use crate::domain::service::{ConnectionRegistry, ParticipantResolver};

/// 事件主题
#[derive(Debug, Clone)]
pub struct DeliveryTopics {
    pub persistence: String,
    pub notification: String,
}

pub struct DeliveryDomainService {
    registry: Arc<ConnectionRegistry>,
    resolver: Arc<ParticipantResolver>,
    publisher: Arc<dyn EventPublisher>,
    signer: Option<Arc<dyn FileUrlSigner>>,
    topics: DeliveryTopics,
    metrics: Arc<GatewayMetrics>,
}

impl DeliveryDomainService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        resolver: Arc<ParticipantResolver>,
        publisher: Arc<dyn EventPublisher>,
        signer: Option<Arc<dyn FileUrlSigner>>,
        topics: DeliveryTopics,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            registry,
            resolver,
            publisher,
            signer,
            topics,
            metrics,
        }
    }

    /// 处理一条入站帧，解码失败时返回 None
    #[instrument(skip(self, frame), fields(conversation_id, message_type))]
    pub async fn deliver(&self, frame: InboundFrame) -> Option<DeliveryReport> {
        let started = Instant::now();

        let mut message = match ChatMessage::decode(&frame.payload) {
            Ok(message) => message,
            Err(err) => {
                self.metrics.decode_failures_total.inc();
                warn!(
                    error = %err,
                    origin = frame.origin.as_ref().map(|o| o.user_id.as_str()).unwrap_or("-"),
                    "Dropping undecodable inbound frame"
                );
                return None;
            }
        };
        self.normalize(&mut message, &frame);

        let span = tracing::Span::current();
        span.record("conversation_id", message.conversation_id);
        span.record("message_type", message.message_type.as_str());
        self.metrics
            .messages_dispatched_total
            .with_label_values(&[message.message_type.as_str()])
            .inc();

        let mut report = DeliveryReport {
            conversation_id: message.conversation_id,
            ..Default::default()
        };

        report.persistence_published = self.publish_persistence(&message).await;

        self.enrich(&mut message).await;

        let members = self.resolver.resolve(message.conversation_id).await;
        if members.is_empty() {
            debug!(conversation_id = message.conversation_id, "No recipients resolved");
        } else {
            self.fan_out(&message, &members, &mut report).await;
        }

        self.metrics
            .dispatch_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        debug!(
            conversation_id = report.conversation_id,
            delivered = report.delivered,
            notified = report.notified,
            evicted = report.evicted,
            persisted = report.persistence_published,
            "Message dispatched"
        );

        Some(report)
    }

    /// 以认证身份为准，补齐缺省字段
    fn normalize(&self, message: &mut ChatMessage, frame: &InboundFrame) {
        if let Some(origin) = &frame.origin {
            if !message.sender_id.is_empty() && message.sender_id != origin.user_id {
                warn!(
                    claimed = %message.sender_id,
                    authenticated = %origin.user_id,
                    "sender_id does not match authenticated user, overriding"
                );
            }
            message.sender_id = origin.user_id.clone();
            if message.sender_name().is_none() && !origin.display_name.is_empty() {
                message.sender_name = Some(origin.display_name.clone());
            }
        }
        if message.created_at.is_none() {
            message.created_at = Some(Utc::now());
        }
    }

    async fn publish_persistence(&self, message: &ChatMessage) -> bool {
        let durable = message.without_derived_fields();
        match self
            .publisher
            .publish_persistence(&self.topics.persistence, &durable)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                self.metrics
                    .publish_failures_total
                    .with_label_values(&[self.topics.persistence.as_str()])
                    .inc();
                warn!(
                    conversation_id = message.conversation_id,
                    error = %err,
                    "Failed to publish persistence event"
                );
                false
            }
        }
    }

    async fn enrich(&self, message: &mut ChatMessage) {
        if !message.needs_file_url() {
            return;
        }
        let Some(signer) = &self.signer else {
            debug!("No object store configured, delivering file message without url");
            return;
        };
        let Some(path) = message.file_path().map(str::to_string) else {
            return;
        };

        match signer.presigned_url(&path).await {
            Ok(url) => message.file_url = Some(url),
            Err(err) => warn!(file_path = %path, error = %err, "Failed to sign file url"),
        }
    }

    async fn fan_out(&self, message: &ChatMessage, members: &[String], report: &mut DeliveryReport) {
        let frame: OutboundFrame = match message.to_json() {
            Ok(json) => Arc::from(json),
            Err(err) => {
                warn!(error = %err, "Failed to encode outbound frame");
                return;
            }
        };

        for member in members {
            let is_sender = *member == message.sender_id;
            if is_sender && !message.message_type.includes_sender() {
                continue;
            }

            match self.registry.try_enqueue(member, frame.clone()).await {
                EnqueueOutcome::Delivered => {
                    report.delivered += 1;
                    self.metrics
                        .deliveries_total
                        .with_label_values(&["delivered"])
                        .inc();
                    continue;
                }
                EnqueueOutcome::Stalled(key) | EnqueueOutcome::Closed(key) => {
                    warn!(connection = %key, "Outbound queue unavailable, evicting connection");
                    self.registry.unregister(&key).await;
                    report.evicted += 1;
                    self.metrics
                        .deliveries_total
                        .with_label_values(&["evicted"])
                        .inc();
                }
                EnqueueOutcome::Offline => {}
            }

            if !is_sender && self.publish_notification(message, member).await {
                report.notified += 1;
            }
        }
    }

    async fn publish_notification(&self, message: &ChatMessage, receiver_id: &str) -> bool {
        let notification = NotificationPayload::for_recipient(message, receiver_id);
        match self
            .publisher
            .publish_notification(&self.topics.notification, &notification)
            .await
        {
            Ok(()) => {
                self.metrics.notification_events_total.inc();
                true
            }
            Err(err) => {
                self.metrics
                    .publish_failures_total
                    .with_label_values(&[self.topics.notification.as_str()])
                    .inc();
                warn!(receiver_id, error = %err, "Failed to publish notification event");
                false
            }
        }
    }
}
