// 会话协调器（控制面边界）
//
// 编排器只通过这四个操作与控制面交互：
// initiate / credential / finalize / abort。
// initiate 之后的每次调用必须同时携带 sessionId 与 objectKey，
// 缺任一项在本地即被拒绝，不发起网络请求。

pub mod http;

use crate::error::UploadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::{HttpPartTransport, HttpSessionCoordinator};

/// 多分片上传会话
///
/// 由 `initiate` 创建，存活至 `finalize` / `abort`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// 会话 ID（后端生成）
    pub session_id: String,
    /// 对象键
    pub object_key: String,
}

/// 单个分片的上传结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartResult {
    /// 分片序号（1 起始）
    pub part_number: u32,
    /// 完整性令牌（去除首尾引号后的 ETag）
    pub integrity_token: String,
}

/// 会话协调器
///
/// 控制面的客户端抽象，HTTP 实现见 `HttpSessionCoordinator`，
/// 测试中可用内存实现替代
#[async_trait]
pub trait SessionCoordinator: Send + Sync {
    /// 发起多分片上传会话
    async fn initiate(&self, name: &str, content_type: &str)
        -> Result<UploadSession, UploadError>;

    /// 获取单个分片的上传凭证（时效性签名 URL）
    ///
    /// 凭证按需获取、每次尝试获取一次，严禁为所有分片预取
    async fn credential(
        &self,
        session: &UploadSession,
        part_number: u32,
    ) -> Result<String, UploadError>;

    /// 合并分片，完成上传（parts 必须已按分片序号升序排列）
    async fn finalize(
        &self,
        session: &UploadSession,
        parts: &[PartResult],
    ) -> Result<(), UploadError>;

    /// 中止会话（尽力而为）
    async fn abort(&self, session: &UploadSession) -> Result<(), UploadError>;
}

/// 分片字节传输
///
/// 对签名 URL 执行原始字节 PUT，成功时返回完整性令牌
#[async_trait]
pub trait PartTransport: Send + Sync {
    async fn put_part(&self, signed_url: &str, data: Vec<u8>) -> Result<String, UploadError>;
}

/// 会话字段本地校验
///
/// 返回第一个缺失的字段名
pub(crate) fn validate_session(session: &UploadSession) -> Result<(), UploadError> {
    if session.session_id.is_empty() {
        return Err(UploadError::Validation("sessionId".to_string()));
    }
    if session.object_key.is_empty() {
        return Err(UploadError::Validation("objectKey".to_string()));
    }
    Ok(())
}
