// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 对象存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 上传配置
///
/// 分片大小与并发数默认按文件大小自适应（见 `uploader::planner`），
/// 这里只保留重试/超时等可调参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 单个分片最大尝试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 单次分片传输硬超时（秒）
    #[serde(default = "default_part_timeout_secs")]
    pub part_timeout_secs: u64,
    /// 退避初始延迟（毫秒）
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// 退避延迟上限（毫秒）
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// 分片大小覆盖（MB，留空则按文件大小自适应；调优/测试用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_override_mb: Option<u64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_part_timeout_secs() -> u64 {
    120
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_cap_ms() -> u64 {
    10000
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            part_timeout_secs: default_part_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            chunk_size_override_mb: None,
        }
    }
}

/// 对象存储配置（S3 兼容）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 存储端点（如 s3.us-east-1.amazonaws.com）
    #[serde(default)]
    pub endpoint: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// 桶名（未配置时控制面接口返回 500）
    #[serde(default)]
    pub bucket: String,
    /// Access Key
    #[serde(default)]
    pub access_key: String,
    /// Secret Key
    #[serde(default)]
    pub secret_key: String,
    /// 签名 URL 有效期（秒）
    #[serde(default = "default_credential_ttl_secs")]
    pub credential_ttl_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_credential_ttl_secs() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            credential_ttl_secs: default_credential_ttl_secs(),
        }
    }
}

impl StorageConfig {
    /// 是否已配置齐备（桶名是硬性要求）
    pub fn is_configured(&self) -> bool {
        !self.bucket.is_empty() && !self.endpoint.is_empty()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        let config: AppConfig = toml::from_str(&content).context("解析配置文件失败")?;
        Ok(config)
    }

    /// 从文件加载配置，失败时使用默认配置
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("加载配置失败，使用默认配置: {}", e);
                Self::default()
            }
        }
    }

    /// 保存配置到文件
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).await.ok();
        }
        fs::write(path.as_ref(), content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.max_retries, 3);
        assert_eq!(config.upload.part_timeout_secs, 120);
        assert_eq!(config.upload.backoff_base_ms, 2000);
        assert_eq!(config.upload.backoff_cap_ms, 10000);
        assert!(config.upload.chunk_size_override_mb.is_none());
        assert!(!config.storage.is_configured());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // 只配置 storage 节，其余节取默认值
        let config: AppConfig = toml::from_str(
            r#"
            [storage]
            endpoint = "s3.example.com"
            bucket = "uploads"
            access_key = "AK"
            secret_key = "SK"
            "#,
        )
        .unwrap();

        assert!(config.storage.is_configured());
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.credential_ttl_secs, 3600);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upload.max_retries, 3);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");

        let mut config = AppConfig::default();
        config.storage.bucket = "my-bucket".to_string();
        config.upload.max_retries = 5;
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.storage.bucket, "my-bucket");
        assert_eq!(loaded.upload.max_retries, 5);
    }
}
