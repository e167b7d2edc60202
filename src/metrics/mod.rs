//! # Prometheus 指标收集模块
//!
//! 为网关与存储写入服务提供统一的 Prometheus 指标。

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 实时投递网关指标
pub struct GatewayMetrics {
    /// 在线连接数
    pub online_connections: IntGauge,
    /// 已分发的入站消息数
    pub messages_dispatched_total: IntCounterVec,
    /// 入站帧解码失败次数
    pub decode_failures_total: IntCounter,
    /// 按结果统计的单连接投递次数（delivered / evicted）
    pub deliveries_total: IntCounterVec,
    /// 离线通知事件数
    pub notification_events_total: IntCounter,
    /// 事件总线发布失败次数
    pub publish_failures_total: IntCounterVec,
    /// 参与者缓存命中 / 未命中
    pub participant_cache_total: IntCounterVec,
    /// 单条消息分发耗时（秒）
    pub dispatch_duration_seconds: Histogram,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let online_connections = IntGauge::new(
            "chat_gateway_online_connections",
            "Number of registered live connections",
        )
        .expect("Failed to create online_connections metric");

        let messages_dispatched_total = IntCounterVec::new(
            Opts::new(
                "chat_gateway_messages_dispatched_total",
                "Total number of inbound messages dispatched",
            ),
            &["message_type"],
        )
        .expect("Failed to create messages_dispatched_total metric");

        let decode_failures_total = IntCounter::new(
            "chat_gateway_decode_failures_total",
            "Total number of inbound frames that failed to decode",
        )
        .expect("Failed to create decode_failures_total metric");

        let deliveries_total = IntCounterVec::new(
            Opts::new(
                "chat_gateway_deliveries_total",
                "Total number of per-connection delivery attempts",
            ),
            &["outcome"],
        )
        .expect("Failed to create deliveries_total metric");

        let notification_events_total = IntCounter::new(
            "chat_gateway_notification_events_total",
            "Total number of offline notification events published",
        )
        .expect("Failed to create notification_events_total metric");

        let publish_failures_total = IntCounterVec::new(
            Opts::new(
                "chat_gateway_publish_failures_total",
                "Total number of event bus publish failures",
            ),
            &["topic"],
        )
        .expect("Failed to create publish_failures_total metric");

        let participant_cache_total = IntCounterVec::new(
            Opts::new(
                "chat_gateway_participant_cache_total",
                "Participant cache lookups by result",
            ),
            &["result"],
        )
        .expect("Failed to create participant_cache_total metric");

        let dispatch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chat_gateway_dispatch_duration_seconds",
                "Inbound message dispatch duration in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .expect("Failed to create dispatch_duration_seconds metric");

        // 忽略重复注册错误（测试中会多次创建）
        let _ = REGISTRY.register(Box::new(online_connections.clone()));
        let _ = REGISTRY.register(Box::new(messages_dispatched_total.clone()));
        let _ = REGISTRY.register(Box::new(decode_failures_total.clone()));
        let _ = REGISTRY.register(Box::new(deliveries_total.clone()));
        let _ = REGISTRY.register(Box::new(notification_events_total.clone()));
        let _ = REGISTRY.register(Box::new(publish_failures_total.clone()));
        let _ = REGISTRY.register(Box::new(participant_cache_total.clone()));
        let _ = REGISTRY.register(Box::new(dispatch_duration_seconds.clone()));

        Self {
            online_connections,
            messages_dispatched_total,
            decode_failures_total,
            deliveries_total,
            notification_events_total,
            publish_failures_total,
            participant_cache_total,
            dispatch_duration_seconds,
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 存储写入服务指标
pub struct StorageWriterMetrics {
    /// 按结果统计的持久化事件数（persisted / duplicate / skipped / decode_failed / store_failed）
    pub events_processed_total: IntCounterVec,
    /// 数据库写入耗时（秒）
    pub db_write_duration_seconds: Histogram,
    /// 写入重试次数
    pub store_retries_total: IntCounter,
}

impl StorageWriterMetrics {
    pub fn new() -> Self {
        let events_processed_total = IntCounterVec::new(
            Opts::new(
                "chat_storage_writer_events_processed_total",
                "Total number of persistence events processed",
            ),
            &["outcome"],
        )
        .expect("Failed to create events_processed_total metric");

        let db_write_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chat_storage_writer_db_write_duration_seconds",
                "Database write duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .expect("Failed to create db_write_duration_seconds metric");

        let store_retries_total = IntCounter::new(
            "chat_storage_writer_store_retries_total",
            "Total number of store write retries",
        )
        .expect("Failed to create store_retries_total metric");

        let _ = REGISTRY.register(Box::new(events_processed_total.clone()));
        let _ = REGISTRY.register(Box::new(db_write_duration_seconds.clone()));
        let _ = REGISTRY.register(Box::new(store_retries_total.clone()));

        Self {
            events_processed_total,
            db_write_duration_seconds,
            store_retries_total,
        }
    }
}

impl Default for StorageWriterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Prometheus 指标导出格式
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
