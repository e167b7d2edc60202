//! 写入重试机制（指数退避策略）

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 从配置创建重试策略
    pub fn from_config(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay_ms,
            max_delay_ms,
            ..Self::default()
        }
    }

    /// 计算第 `attempt` 次失败后的等待时间（指数退避）
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// 判断错误是否值得重试
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for anyhow::Error {
    fn is_retryable(&self) -> bool {
        match self.downcast_ref::<sqlx::Error>() {
            // 数据异常（22）与约束冲突（23）重试也不会成功
            Some(sqlx::Error::Database(db)) => !matches!(
                db.code().as_deref().map(|code| &code[..code.len().min(2)]),
                Some("22") | Some("23")
            ),
            Some(sqlx::Error::ColumnDecode { .. }) | Some(sqlx::Error::TypeNotFound { .. }) => false,
            _ => true,
        }
    }
}

/// 按策略执行，返回最终结果与实际尝试次数
pub async fn execute_with_retry<F, Fut, T>(policy: &RetryPolicy, mut f: F) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                let delay = policy.calculate_delay(attempt - 1);
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::anyhow;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(max_attempts, 1, 2)
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = execute_with_retry(&fast_policy(5), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("connection reset"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (result, attempts) =
            execute_with_retry(&fast_policy(3), || async { Err::<(), _>(anyhow!("down")) }).await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }
}
