//! 会话成员解析（cache-aside）

use std::collections::HashSet;
use std::sync::Arc;

use chat_core::metrics::GatewayMetrics;
use tracing::{debug, warn};

use crate::domain::repository::{ParticipantCache, ParticipantDirectory};

pub struct ParticipantResolver {
    cache: Arc<dyn ParticipantCache>,
    directory: Arc<dyn ParticipantDirectory>,
    metrics: Arc<GatewayMetrics>,
}

impl ParticipantResolver {
    pub fn new(
        cache: Arc<dyn ParticipantCache>,
        directory: Arc<dyn ParticipantDirectory>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            cache,
            directory,
            metrics,
        }
    }

    /// 解析会话成员
    ///
    /// 缓存命中且非空时直接返回；否则查询数据源并回填缓存。
    /// 数据源不可用时返回空集合。
    pub async fn resolve(&self, conversation_id: i64) -> Vec<String> {
        match self.cache.get(conversation_id).await {
            Ok(Some(members)) if !members.is_empty() => {
                self.metrics
                    .participant_cache_total
                    .with_label_values(&["hit"])
                    .inc();
                return dedup(members);
            }
            Ok(_) => {
                debug!(conversation_id, "Participant cache miss");
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "Participant cache lookup failed");
            }
        }
        self.metrics
            .participant_cache_total
            .with_label_values(&["miss"])
            .inc();

        let members = match self.directory.list_participants(conversation_id).await {
            Ok(members) => dedup(members),
            Err(err) => {
                warn!(
                    conversation_id,
                    error = %err,
                    "Failed to list participants, skipping real-time delivery"
                );
                return Vec::new();
            }
        };

        if !members.is_empty() {
            if let Err(err) = self.cache.put(conversation_id, &members).await {
                warn!(conversation_id, error = %err, "Failed to populate participant cache");
            }
        }

        members
    }
}

fn dedup(members: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(members.len());
    members
        .into_iter()
        .filter(|member| !member.is_empty() && seen.insert(member.clone()))
        .collect()
}
