// 应用状态

use crate::config::AppConfig;
use crate::storage::StorageClient;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<RwLock<AppConfig>>,
    /// 对象存储客户端
    pub storage: Arc<StorageClient>,
}

impl AppState {
    /// 创建新的应用状态
    pub async fn new() -> anyhow::Result<Self> {
        // 加载配置
        let config = AppConfig::load_or_default("config/app.toml").await;
        Self::with_config(config)
    }

    /// 用给定配置创建应用状态
    pub fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        let storage = Arc::new(StorageClient::new(config.storage.clone())?);
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            storage,
        })
    }
}
