use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use rdkafka::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::Message;
use tracing::{debug, error, info, warn};

use crate::application::PersistenceCommandHandler;
use crate::application::commands::ProcessPersistenceEventCommand;
use crate::config::StorageWriterConfig;

/// 持久化主题消费者
///
/// 关闭自动提交：每条记录处理完成（写入成功、跳过或重试耗尽）后才提交偏移量。
pub struct StorageWriterConsumer {
    config: Arc<StorageWriterConfig>,
    kafka_consumer: StreamConsumer,
    command_handler: Arc<PersistenceCommandHandler>,
}

impl StorageWriterConsumer {
    pub fn new(
        config: Arc<StorageWriterConfig>,
        command_handler: Arc<PersistenceCommandHandler>,
    ) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_bootstrap)
            .set("group.id", &config.kafka_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set(
                "session.timeout.ms",
                config.kafka_session_timeout_ms.to_string(),
            );
        if let Some(client_id) = &config.kafka_client_id {
            client_config.set("client.id", client_id);
        }
        for (key, value) in &config.kafka_options {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .context("failed to build kafka consumer")?;
        consumer
            .subscribe(&[config.kafka_topic.as_str()])
            .context("failed to subscribe persistence topic")?;

        info!(
            bootstrap = %config.kafka_bootstrap,
            group = %config.kafka_group,
            topic = %config.kafka_topic,
            "StorageWriter Kafka consumer initialized"
        );

        Ok(Self {
            config,
            kafka_consumer: consumer,
            command_handler,
        })
    }

    /// 消费直到收到停机信号
    pub async fn consume_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            topic = %self.config.kafka_topic,
            group_id = %self.config.kafka_group,
            "Starting Kafka consumer loop"
        );
        tokio::pin!(shutdown);

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Kafka consumer received shutdown signal");
                    break;
                }
                received = self.kafka_consumer.recv() => match received {
                    Ok(message) => message,
                    Err(err) => {
                        // 单次拉取错误不终止消费循环
                        error!(error = ?err, "Error receiving message from Kafka");
                        continue;
                    }
                },
            };

            self.process_message(&message).await;
            self.commit_message(&message);
        }

        if let Err(err) = self.kafka_consumer.commit_consumer_state(CommitMode::Sync) {
            debug!(error = ?err, "Final offset commit skipped");
        }
        Ok(())
    }

    async fn process_message(&self, message: &BorrowedMessage<'_>) {
        let Some(payload) = message.payload() else {
            warn!(
                partition = message.partition(),
                offset = message.offset(),
                "Kafka message without payload encountered"
            );
            return;
        };

        let command = ProcessPersistenceEventCommand {
            payload: payload.to_vec(),
            source: format!("{}@{}", message.partition(), message.offset()),
        };
        let outcome = self.command_handler.handle(command).await;
        debug!(
            partition = message.partition(),
            offset = message.offset(),
            outcome = outcome.as_str(),
            "Kafka message processed"
        );
    }

    fn commit_message(&self, message: &BorrowedMessage<'_>) {
        if let Err(err) = self
            .kafka_consumer
            .commit_message(message, CommitMode::Async)
        {
            warn!(error = ?err, "Failed to commit Kafka message");
        }
    }
}
