// 可重试操作封装
//
// 从分片上传流程中抽出的通用重试循环：
// 由最大尝试次数和退避函数参数化，只重试可重试错误，可独立测试

use crate::error::UploadError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// 计算指数退避延迟
///
/// `min(base * 2^(attempt-1), cap)`，attempt 从 1 开始
///
/// 默认参数下的延迟序列：2s, 4s, 8s（上限 10s）
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(multiplier).min(cap)
}

/// 带退避的重试执行
///
/// `op` 接收当前尝试序号（1 起始）。致命错误（`is_retryable() == false`）
/// 立即返回；可重试错误在尝试间按 `backoff(attempt)` 等待；
/// 耗尽 `max_attempts` 次后返回最后一个错误
pub async fn retry_with_backoff<T, F, Fut, B>(
    max_attempts: u32,
    backoff: B,
    mut op: F,
) -> Result<T, UploadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
    B: Fn(u32) -> Duration,
{
    debug_assert!(max_attempts >= 1);
    let mut last_error = UploadError::Cancelled;

    for attempt in 1..=max_attempts.max(1) {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff(attempt);
                warn!("第 {} 次尝试失败，{:?} 后重试: {}", attempt, delay, e);
                sleep(delay).await;
                last_error = e;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_backoff(_attempt: u32) -> Duration {
        Duration::ZERO
    }

    #[test]
    fn test_backoff_sequence() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(8));
        // 封顶
        assert_eq!(backoff_delay(4, base, cap), Duration::from_secs(10));
        assert_eq!(backoff_delay(30, base, cap), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result = retry_with_backoff(3, no_backoff, move |attempt| {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    Err(UploadError::Transfer("transient".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        // 恰好 3 次，不多试
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<(), _> = retry_with_backoff(3, no_backoff, move |attempt| {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UploadError::Transfer(format!("attempt {}", attempt)))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(UploadError::Transfer(msg)) if msg == "attempt 3"));
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_op = Arc::clone(&calls);

        let result: Result<(), _> = retry_with_backoff(3, no_backoff, move |_| {
            let calls = Arc::clone(&calls_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UploadError::Validation("objectKey".into()))
            }
        })
        .await;

        // 校验错误不重试
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(UploadError::Validation(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let result = retry_with_backoff(2, no_backoff, |attempt| async move {
            if attempt == 1 {
                Err(UploadError::TransferTimeout(Duration::from_secs(120)))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
    }
}
