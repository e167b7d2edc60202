//! 持久化命令处理器
//!
//! 处理器不向上返回错误：解码失败、跳过与写入失败都会转换为
//! `PersistOutcome`，由消费端在处理后提交偏移量。

use std::sync::Arc;
use std::time::Instant;

use chat_core::metrics::StorageWriterMetrics;
use chat_core::protocol::ChatMessage;
use tracing::{debug, error, info, instrument, warn};

use crate::application::commands::ProcessPersistenceEventCommand;
use crate::domain::model::{PersistOperation, PersistOutcome, StoreOutcome};
use crate::domain::repository::MessageStore;
use crate::domain::service::plan_operation;
use crate::infrastructure::retry::{RetryPolicy, execute_with_retry};

pub struct PersistenceCommandHandler {
    store: Arc<dyn MessageStore>,
    retry_policy: RetryPolicy,
    metrics: Arc<StorageWriterMetrics>,
}

impl PersistenceCommandHandler {
    pub fn new(
        store: Arc<dyn MessageStore>,
        retry_policy: RetryPolicy,
        metrics: Arc<StorageWriterMetrics>,
    ) -> Self {
        Self {
            store,
            retry_policy,
            metrics,
        }
    }

    #[instrument(skip(self, command), fields(source = %command.source))]
    pub async fn handle(&self, command: ProcessPersistenceEventCommand) -> PersistOutcome {
        let outcome = self.process(&command).await;
        self.metrics
            .events_processed_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        outcome
    }

    async fn process(&self, command: &ProcessPersistenceEventCommand) -> PersistOutcome {
        let message = match ChatMessage::decode(&command.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "Skipping undecodable persistence event");
                return PersistOutcome::DecodeFailed;
            }
        };

        let conversation_id = message.conversation_id;
        let message_type = message.message_type;
        let operation = plan_operation(message);

        if let PersistOperation::Skip(reason) = operation {
            debug!(conversation_id, reason, "Skipping persistence event");
            return PersistOutcome::Skipped;
        }

        let started = Instant::now();
        let (result, attempts) =
            execute_with_retry(&self.retry_policy, || self.execute(&operation)).await;
        self.metrics
            .db_write_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        if attempts > 1 {
            self.metrics.store_retries_total.inc_by(u64::from(attempts - 1));
        }

        match result {
            Ok(outcome) => {
                info!(
                    conversation_id,
                    message_type = %message_type,
                    outcome = outcome.as_str(),
                    "Persistence event handled"
                );
                outcome
            }
            Err(err) => {
                error!(
                    conversation_id,
                    message_type = %message_type,
                    attempts,
                    error = ?err,
                    "Failed to persist event, skipping"
                );
                PersistOutcome::StoreFailed
            }
        }
    }

    async fn execute(&self, operation: &PersistOperation) -> anyhow::Result<PersistOutcome> {
        match operation {
            PersistOperation::Create(message) => {
                Ok(match self.store.create_message(message).await? {
                    StoreOutcome::Inserted(id) => {
                        debug!(message_id = id, "Message row inserted");
                        PersistOutcome::Persisted
                    }
                    StoreOutcome::Duplicate => PersistOutcome::Duplicate,
                })
            }
            PersistOperation::UpdateLastRead(update) => {
                if !self.store.update_last_read(update).await? {
                    debug!(
                        conversation_id = update.conversation_id,
                        user_id = %update.user_id,
                        "No participant row for last-read update"
                    );
                }
                Ok(PersistOutcome::Persisted)
            }
            PersistOperation::Skip(_) => Ok(PersistOutcome::Skipped),
        }
    }
}
