// 对象存储客户端（S3 兼容）
//
// 控制面对存储后端的四个动作：发起分片会话、签发分片凭证、
// 合并完成、中止清理。请求用 SigV4 头签名，分片凭证是预签名 PUT URL

use anyhow::{Context, Result};
use chrono::Utc;
use quick_xml::{de::from_str, se::to_string};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::session::PartResult;
use crate::storage::signer::{self, EMPTY_PAYLOAD_HASH};

/// 发起分片上传的响应
#[derive(Deserialize, Debug)]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "$unflatten=Bucket")]
    pub bucket: String,
    #[serde(rename = "$unflatten=Key")]
    pub key: String,
    #[serde(rename = "$unflatten=UploadId")]
    pub upload_id: String,
}

/// 完成请求中的单个分片
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Part {
    #[serde(rename = "$unflatten=PartNumber")]
    pub part_number: u32,
    #[serde(rename = "$unflatten=ETag")]
    pub etag: String,
}

/// 完成分片上传的请求体
#[derive(Deserialize, Serialize, Debug)]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part", default)]
    pub parts: Vec<Part>,
}

/// 存储客户端
pub struct StorageClient {
    client: reqwest::Client,
    config: StorageConfig,
}

impl StorageClient {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// 虚拟主机风格的对象主机名
    fn host(&self) -> String {
        format!("{}.{}", self.config.bucket, self.config.endpoint)
    }

    fn object_path(key: &str) -> String {
        format!("/{}", key.trim_start_matches('/'))
    }

    /// 带 SigV4 头签名的请求
    async fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        query_params: BTreeMap<String, String>,
        body: Option<String>,
    ) -> Result<reqwest::Response> {
        let host = self.host();
        let path = Self::object_path(key);
        let date = Utc::now();
        let timestamp = format!("{}", date.format("%Y%m%dT%H%M%SZ"));

        let payload_hash = match &body {
            Some(b) => signer::hexdigest(b.as_bytes()),
            None => EMPTY_PAYLOAD_HASH.to_string(),
        };

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host.clone());
        headers.insert("x-amz-date".to_string(), timestamp.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());

        let authorization = signer::sign_headers(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.region,
            date,
            method.as_str(),
            &path,
            &query_params,
            &headers,
            &payload_hash,
        )?;

        let url = format!("https://{}{}", host, path);
        let mut request = self
            .client
            .request(method, &url)
            .query(&query_params.iter().collect::<Vec<_>>())
            .header("Authorization", authorization)
            .header("x-amz-date", timestamp)
            .header("x-amz-content-sha256", payload_hash);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.context("存储后端请求失败")?;
        Ok(response)
    }

    /// 发起分片上传会话，返回后端会话 ID
    pub async fn create_session(&self, key: &str) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("uploads".to_string(), String::new());

        let response = self
            .signed_request(reqwest::Method::POST, key, params, None)
            .await?;
        let status = response.status();
        let text = response.text().await.context("读取响应体失败")?;
        if !status.is_success() {
            anyhow::bail!("发起分片会话失败: {} - {}", status, text);
        }

        let result: InitiateMultipartUploadResult =
            from_str(&text).context("解析 InitiateMultipartUploadResult 失败")?;
        info!(
            "分片会话已创建: bucket={}, key={}, upload_id={}",
            result.bucket, result.key, result.upload_id
        );
        Ok(result.upload_id)
    }

    /// 为指定分片签发预签名 PUT URL
    pub fn presign_part(&self, key: &str, upload_id: &str, part_number: u32) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("partNumber".to_string(), part_number.to_string());
        params.insert("uploadId".to_string(), upload_id.to_string());

        let url = signer::presign_url(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.region,
            Utc::now(),
            "PUT",
            &self.host(),
            &Self::object_path(key),
            &params,
            self.config.credential_ttl_secs,
        )?;
        debug!("已签发分片凭证: key={}, part={}", key, part_number);
        Ok(url)
    }

    /// 合并完成分片上传
    ///
    /// 分片清单必须按分片号升序且令牌与实际上传一致，否则后端拒绝
    pub async fn complete_session(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<()> {
        let cmpu = CompleteMultipartUpload {
            parts: parts
                .iter()
                .map(|p| Part {
                    part_number: p.part_number,
                    etag: p.integrity_token.clone(),
                })
                .collect(),
        };
        let payload = to_string(&cmpu).context("序列化 CompleteMultipartUpload 失败")?;

        let mut params = BTreeMap::new();
        params.insert("uploadId".to_string(), upload_id.to_string());

        let response = self
            .signed_request(reqwest::Method::POST, key, params, Some(payload))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("合并分片失败: {} - {}", status, text);
        }

        info!("分片会话已完成: key={}, parts={}", key, parts.len());
        Ok(())
    }

    /// 中止分片上传会话，清理后端暂存分片
    pub async fn abort_session(&self, key: &str, upload_id: &str) -> Result<()> {
        let mut params = BTreeMap::new();
        params.insert("uploadId".to_string(), upload_id.to_string());

        let response = self
            .signed_request(reqwest::Method::DELETE, key, params, None)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("中止分片会话失败: {} - {}", status, text);
        }

        info!("分片会话已中止: key={}, upload_id={}", key, upload_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_result_xml_parsing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <InitiateMultipartUploadResult>
                <Bucket>my-bucket</Bucket>
                <Key>uploads/video.mp4</Key>
                <UploadId>VXBsb2FkSWQ</UploadId>
            </InitiateMultipartUploadResult>"#;

        let result: InitiateMultipartUploadResult = from_str(xml).unwrap();
        assert_eq!(result.bucket, "my-bucket");
        assert_eq!(result.key, "uploads/video.mp4");
        assert_eq!(result.upload_id, "VXBsb2FkSWQ");
    }

    #[test]
    fn test_complete_request_xml_shape() {
        let cmpu = CompleteMultipartUpload {
            parts: vec![
                Part {
                    part_number: 1,
                    etag: "etag-1".into(),
                },
                Part {
                    part_number: 2,
                    etag: "etag-2".into(),
                },
            ],
        };

        let xml = to_string(&cmpu).unwrap();
        assert!(xml.contains("<Part><PartNumber>1</PartNumber><ETag>etag-1</ETag></Part>"));
        assert!(xml.contains("<PartNumber>2</PartNumber>"));
    }

    #[test]
    fn test_object_path_normalization() {
        assert_eq!(StorageClient::object_path("a/b.txt"), "/a/b.txt");
        assert_eq!(StorageClient::object_path("/a/b.txt"), "/a/b.txt");
    }
}
