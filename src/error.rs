// 上传错误类型定义
//
// 错误分为两类：
// - 可重试错误：网络传输失败、超时、缺少完整性令牌（分片级重试消化）
// - 致命错误：参数校验失败、重试耗尽、合并失败（上抛到任务级）

use std::time::Duration;
use thiserror::Error;

/// 上传错误
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// 参数校验失败（不可重试）
    #[error("缺少必需参数: {0}")]
    Validation(String),

    /// 分片传输超时（可重试）
    #[error("分片传输超时（{0:?}）")]
    TransferTimeout(Duration),

    /// 分片传输失败（可重试，服务端返回错误或网络异常）
    #[error("分片传输失败: {0}")]
    Transfer(String),

    /// 服务端返回成功但缺少完整性令牌（可重试，视同传输失败）
    #[error("分片 {0} 响应缺少完整性令牌")]
    MissingIntegrityToken(u32),

    /// 分片重试耗尽（任务级致命错误，不影响其他分片）
    #[error("分片 {part_number} 上传失败（已重试 {attempts} 次）: {last_error}")]
    PartExhausted {
        part_number: u32,
        attempts: u32,
        last_error: String,
    },

    /// 合并分片失败（致命，会话保留不自动清理）
    #[error("完成上传失败: {0}")]
    Finalize(String),

    /// 任务已取消
    #[error("上传已取消")]
    Cancelled,
}

impl UploadError {
    /// 是否可在分片级重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Transfer(_)
                | UploadError::TransferTimeout(_)
                | UploadError::MissingIntegrityToken(_)
        )
    }
}
