// 控制面 HTTP 客户端实现
//
// 四个 JSON 接口 + 对签名 URL 的原始字节 PUT。
// 配置（基础 URL、客户端）全部经构造函数注入，不依赖任何进程级可变状态。

use crate::error::UploadError;
use crate::session::{validate_session, PartResult, PartTransport, SessionCoordinator, UploadSession};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// initiate 请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest<'a> {
    name: &'a str,
    content_type: &'a str,
}

/// credential 请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRequest<'a> {
    session_id: &'a str,
    object_key: &'a str,
    parts: Vec<u32>,
}

/// credential 响应
#[derive(Debug, Deserialize)]
struct CredentialResponse {
    urls: Vec<SignedPartUrl>,
}

/// 单个分片的签名 URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPartUrl {
    pub part_number: u32,
    pub signed_url: String,
}

/// finalize 请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest<'a> {
    session_id: &'a str,
    object_key: &'a str,
    parts: &'a [PartResult],
}

/// abort 请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AbortRequest<'a> {
    session_id: &'a str,
    object_key: &'a str,
}

/// 控制面错误响应体
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// 日志用短 ID（按字符截断，会话 ID 可能含多字节字符）
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// 从响应中提取错误描述
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let detail = match response.json::<ErrorBody>().await {
        Ok(body) => body.error.or(body.message),
        Err(_) => None,
    };
    match detail {
        Some(msg) => format!("HTTP {}: {}", status.as_u16(), msg),
        None => format!("HTTP {}", status.as_u16()),
    }
}

/// 控制面 HTTP 会话协调器
#[derive(Debug, Clone)]
pub struct HttpSessionCoordinator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionCoordinator {
    /// 创建协调器
    ///
    /// `base_url` 形如 `http://127.0.0.1:8080/api/v1`
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn endpoint(&self, op: &str) -> String {
        format!("{}/uploads/{}", self.base_url, op)
    }
}

#[async_trait]
impl SessionCoordinator for HttpSessionCoordinator {
    async fn initiate(
        &self,
        name: &str,
        content_type: &str,
    ) -> Result<UploadSession, UploadError> {
        if name.is_empty() {
            return Err(UploadError::Validation("name".to_string()));
        }

        let response = self
            .client
            .post(self.endpoint("initiate"))
            .json(&InitiateRequest { name, content_type })
            .send()
            .await
            .map_err(|e| UploadError::Transfer(format!("发起上传请求失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(UploadError::Transfer(format!(
                "发起上传失败: {}",
                error_message(response).await
            )));
        }

        let session: UploadSession = response
            .json()
            .await
            .map_err(|e| UploadError::Transfer(format!("解析会话响应失败: {}", e)))?;

        debug!(
            "会话已创建: session_id={}..., object_key={}",
            short_id(&session.session_id),
            session.object_key
        );
        Ok(session)
    }

    async fn credential(
        &self,
        session: &UploadSession,
        part_number: u32,
    ) -> Result<String, UploadError> {
        validate_session(session)?;

        let response = self
            .client
            .post(self.endpoint("credential"))
            .json(&CredentialRequest {
                session_id: &session.session_id,
                object_key: &session.object_key,
                parts: vec![part_number],
            })
            .send()
            .await
            .map_err(|e| UploadError::Transfer(format!("获取上传凭证请求失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(UploadError::Transfer(format!(
                "获取分片 {} 凭证失败: {}",
                part_number,
                error_message(response).await
            )));
        }

        let body: CredentialResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Transfer(format!("解析凭证响应失败: {}", e)))?;

        body.urls
            .into_iter()
            .find(|u| u.part_number == part_number)
            .map(|u| u.signed_url)
            .ok_or_else(|| {
                UploadError::Transfer(format!("凭证响应缺少分片 {} 的 URL", part_number))
            })
    }

    async fn finalize(
        &self,
        session: &UploadSession,
        parts: &[PartResult],
    ) -> Result<(), UploadError> {
        validate_session(session)?;
        if parts.is_empty() {
            return Err(UploadError::Validation("parts".to_string()));
        }

        let response = self
            .client
            .post(self.endpoint("finalize"))
            .json(&FinalizeRequest {
                session_id: &session.session_id,
                object_key: &session.object_key,
                parts,
            })
            .send()
            .await
            .map_err(|e| UploadError::Finalize(format!("完成上传请求失败: {}", e)))?;

        if !response.status().is_success() {
            return Err(UploadError::Finalize(error_message(response).await));
        }

        debug!("会话已完成: object_key={}", session.object_key);
        Ok(())
    }

    async fn abort(&self, session: &UploadSession) -> Result<(), UploadError> {
        validate_session(session)?;

        let response = self
            .client
            .post(self.endpoint("abort"))
            .json(&AbortRequest {
                session_id: &session.session_id,
                object_key: &session.object_key,
            })
            .send()
            .await
            .map_err(|e| UploadError::Transfer(format!("中止上传请求失败: {}", e)))?;

        if !response.status().is_success() {
            // abort 为尽力而为，记录但仍上报错误由调用方决定
            let msg = error_message(response).await;
            warn!("中止会话失败: object_key={}, {}", session.object_key, msg);
            return Err(UploadError::Transfer(format!("中止上传失败: {}", msg)));
        }
        Ok(())
    }
}

/// 分片 HTTP 传输
///
/// 对签名 URL 执行 PUT，要求 2xx 且响应头携带 ETag，
/// ETag 去除首尾引号后作为完整性令牌返回
#[derive(Debug, Clone)]
pub struct HttpPartTransport {
    client: reqwest::Client,
}

impl HttpPartTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartTransport for HttpPartTransport {
    async fn put_part(&self, signed_url: &str, data: Vec<u8>) -> Result<String, UploadError> {
        let response = self
            .client
            .put(signed_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(format!("分片上传请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Transfer(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("上传失败")
            )));
        }

        // HTTP 成功但缺少令牌视为失败尝试，而非成功：
        // 宁可暴露可检测的损坏，不做乐观完成
        let token = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        match token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(UploadError::MissingIntegrityToken(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_truncates_by_chars() {
        assert_eq!(short_id("abcdef"), "abcdef");
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        // 多字节会话 ID 不得落在字节边界上截断
        assert_eq!(short_id("会话一二三四五六七八"), "会话一二三四五六");
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let coordinator =
            HttpSessionCoordinator::new(reqwest::Client::new(), "http://127.0.0.1:8080/api/v1/");
        assert_eq!(
            coordinator.endpoint("initiate"),
            "http://127.0.0.1:8080/api/v1/uploads/initiate"
        );
    }
}
