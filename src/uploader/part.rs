// 单分片上传
//
// 分片级状态机：等待凭证 → 传输中 → {成功 | 退避重试 | 失败}
//
// 关键约束：
// - 凭证按需获取，每次尝试恰好请求一次（签名 URL 有时效，长上传不得复用陈旧 URL）
// - 传输带硬超时，超时取消在途请求并按可重试错误处理（与服务端报错区分）
// - HTTP 成功但缺少完整性令牌视为失败尝试
// - 确认成功的分片恰好向进度聚合器上报一次字节数

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::session::{PartResult, PartTransport, SessionCoordinator, UploadSession};
use crate::uploader::planner::PartTask;
use crate::uploader::progress::ProgressAggregator;
use crate::uploader::retry::{backoff_delay, retry_with_backoff};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 暂停轮询间隔
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 分片上传器
///
/// 无分片内可变状态，可被多个分片任务共享
pub struct PartUploader {
    coordinator: Arc<dyn SessionCoordinator>,
    transport: Arc<dyn PartTransport>,
    progress: Arc<ProgressAggregator>,
    cancel_token: CancellationToken,
    is_paused: Arc<AtomicBool>,
    /// 单分片最大尝试次数
    max_attempts: u32,
    /// 单次传输硬超时
    transfer_timeout: Duration,
    /// 退避参数
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl PartUploader {
    pub fn new(
        coordinator: Arc<dyn SessionCoordinator>,
        transport: Arc<dyn PartTransport>,
        progress: Arc<ProgressAggregator>,
        cancel_token: CancellationToken,
        is_paused: Arc<AtomicBool>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            coordinator,
            transport,
            progress,
            cancel_token,
            is_paused,
            max_attempts: config.max_retries.max(1),
            transfer_timeout: Duration::from_secs(config.part_timeout_secs),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// 上传单个分片
    ///
    /// 成功返回分片结果并上报进度；可重试错误耗尽后
    /// 以 `PartExhausted` 上抛（携带分片序号与最后一次错误）
    pub async fn upload_part(
        &self,
        session: &UploadSession,
        source_path: &PathBuf,
        part: &PartTask,
    ) -> Result<PartResult, UploadError> {
        let base = self.backoff_base;
        let cap = self.backoff_cap;

        let result = retry_with_backoff(
            self.max_attempts,
            |attempt| backoff_delay(attempt, base, cap),
            |attempt| self.attempt(session, source_path, part, attempt),
        )
        .await;

        match result {
            Ok(part_result) => {
                // 确认成功才计入进度，恰好一次
                self.progress.record_part(part.size());
                Ok(part_result)
            }
            Err(e) if e.is_retryable() => Err(UploadError::PartExhausted {
                part_number: part.part_number,
                attempts: self.max_attempts,
                last_error: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// 单次尝试：凭证 → 读数据 → 限时传输 → 校验令牌
    async fn attempt(
        &self,
        session: &UploadSession,
        source_path: &PathBuf,
        part: &PartTask,
        attempt: u32,
    ) -> Result<PartResult, UploadError> {
        // 暂停是协作式的：只在尝试边界生效，不抢占在途传输
        self.wait_if_paused().await?;

        debug!(
            "获取分片 {} 的上传凭证（第 {} 次尝试）",
            part.part_number, attempt
        );
        let signed_url = self.coordinator.credential(session, part.part_number).await?;

        let data = part.read_data(source_path).await?;
        let data_len = data.len();

        // 超时只取消当前这一次传输，不跨分片、不跨任务级联
        let attempt_token = self.cancel_token.child_token();
        let token = tokio::select! {
            _ = attempt_token.cancelled() => return Err(UploadError::Cancelled),
            transferred = timeout(self.transfer_timeout, self.transport.put_part(&signed_url, data)) => {
                match transferred {
                    Ok(result) => result.map_err(|e| match e {
                        // 传输层不知道分片序号，这里补上
                        UploadError::MissingIntegrityToken(_) => {
                            UploadError::MissingIntegrityToken(part.part_number)
                        }
                        other => other,
                    })?,
                    Err(_) => {
                        warn!(
                            "分片 {} 传输超时（{}s），按可重试错误处理",
                            part.part_number,
                            self.transfer_timeout.as_secs()
                        );
                        return Err(UploadError::TransferTimeout(self.transfer_timeout));
                    }
                }
            }
        };

        debug!(
            "分片 {} 上传成功: 大小={} bytes, token={}",
            part.part_number, data_len, token
        );

        Ok(PartResult {
            part_number: part.part_number,
            integrity_token: token,
        })
    }

    /// 暂停时协作等待，取消时立即返回
    async fn wait_if_paused(&self) -> Result<(), UploadError> {
        while self.is_paused.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(PAUSE_POLL_INTERVAL) => {}
            }
        }
        if self.cancel_token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }
}
