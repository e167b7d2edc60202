use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chat_core::error::ChatError;
use chat_core::metrics::GatewayMetrics;
use futures::FutureExt;
use futures::future::join_all;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::domain::repository::EventPublisher;

/// 待发送的事件记录
#[derive(Debug, Clone)]
struct EventRecord {
    topic: String,
    key: String,
    payload: Vec<u8>,
}

/// Kafka 事件发布器
///
/// `publish` 只写入有界缓冲区，后台任务按批量大小或刷新间隔发送。
pub struct KafkaEventPublisher {
    producer: Arc<FutureProducer>,
    buffer: Mutex<Vec<EventRecord>>,
    // 串行化刷新，保证同一分区键的发送顺序
    flush_lock: Mutex<()>,
    last_flush_time: Mutex<Instant>,
    closed: AtomicBool,
    capacity: usize,
    batch_size: usize,
    send_timeout: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl KafkaEventPublisher {
    /// 创建发布器并启动后台刷新任务
    pub fn new(config: &GatewayConfig, metrics: Arc<GatewayMetrics>) -> Result<Arc<Self>> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_bootstrap)
            .set("message.timeout.ms", config.kafka_timeout_ms.to_string())
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("linger.ms", "5");
        if let Some(client_id) = &config.kafka_client_id {
            client_config.set("client.id", client_id);
        }
        for (key, value) in &config.kafka_options {
            client_config.set(key, value);
        }
        let producer: FutureProducer = client_config
            .create()
            .context("failed to create kafka producer")?;

        let publisher = Arc::new(Self {
            producer: Arc::new(producer),
            buffer: Mutex::new(Vec::with_capacity(config.kafka_batch_size)),
            flush_lock: Mutex::new(()),
            last_flush_time: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            capacity: config.publish_buffer_capacity,
            batch_size: config.kafka_batch_size.max(1),
            send_timeout: Duration::from_millis(config.kafka_timeout_ms),
            metrics,
        });

        let flush_interval = Duration::from_millis(config.kafka_flush_interval_ms.max(1));
        tokio::spawn(Self::auto_flush_loop(Arc::downgrade(&publisher), flush_interval));

        info!(
            bootstrap = %config.kafka_bootstrap,
            capacity = config.publish_buffer_capacity,
            "Kafka event publisher initialized"
        );

        Ok(publisher)
    }

    /// 自动刷新循环，发布器被释放后退出
    async fn auto_flush_loop(publisher: Weak<Self>, flush_interval: Duration) {
        let mut interval = tokio::time::interval(flush_interval);
        loop {
            interval.tick().await;
            let Some(publisher) = publisher.upgrade() else {
                debug!("Kafka event publisher dropped, stopping flush loop");
                break;
            };

            let should_flush = {
                let buffer = publisher.buffer.lock().await;
                let last_flush = publisher.last_flush_time.lock().await;
                !buffer.is_empty()
                    && (buffer.len() >= publisher.batch_size
                        || last_flush.elapsed() >= flush_interval)
            };

            if should_flush {
                if let Err(e) = publisher.flush().await {
                    error!(error = %e, "Failed to flush event buffer");
                }
            }
        }
    }

    /// 立即发送缓冲区中的全部事件
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        let records: Vec<EventRecord> = {
            let mut buffer = self.buffer.lock().await;
            buffer.drain(..).collect()
        };
        *self.last_flush_time.lock().await = Instant::now();

        if records.is_empty() {
            return Ok(());
        }

        let total = records.len();
        let mut failed = 0usize;
        for chunk in records.chunks(self.batch_size) {
            failed += self.send_batch(chunk).await;
        }

        if failed > 0 {
            return Err(anyhow!("{failed} of {total} events failed to send"));
        }
        debug!(batch_size = total, "Flushed events to Kafka");
        Ok(())
    }

    /// 并发发送一批记录，返回失败数量
    async fn send_batch(&self, records: &[EventRecord]) -> usize {
        let futures: Vec<_> = records
            .iter()
            .map(|record| {
                let future_record = FutureRecord::to(&record.topic)
                    .payload(&record.payload)
                    .key(&record.key);
                self.producer
                    .send(future_record, self.send_timeout)
                    .map(move |result| result.map_err(|(err, _)| (record, err)))
            })
            .collect();

        let mut failed = 0;
        for result in join_all(futures).await {
            if let Err((record, err)) = result {
                failed += 1;
                self.metrics
                    .publish_failures_total
                    .with_label_values(&[record.topic.as_str()])
                    .inc();
                warn!(
                    topic = %record.topic,
                    key = %record.key,
                    error = %err,
                    "Kafka send error"
                );
            }
        }
        failed
    }

    /// 停机：拒绝新事件，发送剩余事件并等待 librdkafka 队列清空
    pub async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let result = self.flush().await;
        let producer = self.producer.clone();
        let timeout = self.send_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .context("producer flush task panicked")?;
        if let Err(err) = flushed {
            warn!(error = %err, "Kafka producer flush did not complete");
        }
        result
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, topic: &str, partition_key: &str, payload: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::PublishClosed.into());
        }
        let mut buffer = self.buffer.lock().await;
        if buffer.len() >= self.capacity {
            return Err(ChatError::PublishBufferFull {
                topic: topic.to_string(),
            }
            .into());
        }
        buffer.push(EventRecord {
            topic: topic.to_string(),
            key: partition_key.to_string(),
            payload,
        });
        Ok(())
    }
}
