// 上传管理器
//
// 负责管理多个上传任务：
// - 任务登记/删除/清理
// - start 批量启动所有等待中的任务，任务之间相互独立
//   （并发上限是任务内的，跨任务没有全局上限）
// - 暂停/恢复为建议性标志，在尝试边界被轮询，不抢占在途传输
// - retry 清零进度、清空错误并用全新凭证整体重传
// - 状态与进度变化发布到事件总线

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::events::{EventBus, UploadEvent};
use crate::session::{PartTransport, SessionCoordinator};
use crate::uploader::engine::UploadEngine;
use crate::uploader::task::{UploadItem, UploadItemStatus};
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 任务运行时信息
#[derive(Clone)]
struct ItemRuntime {
    /// 任务本体
    item: Arc<Mutex<UploadItem>>,
    /// 取消令牌（删除任务时触发）
    cancel_token: CancellationToken,
    /// 暂停标志（引擎与分片上传器共享）
    is_paused: Arc<AtomicBool>,
}

/// 任务统计
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct UploadStats {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_bytes: u64,
}

/// 上传管理器
pub struct UploadManager {
    coordinator: Arc<dyn SessionCoordinator>,
    transport: Arc<dyn PartTransport>,
    items: Arc<DashMap<String, ItemRuntime>>,
    events: EventBus,
    config: UploadConfig,
}

impl UploadManager {
    pub fn new(
        coordinator: Arc<dyn SessionCoordinator>,
        transport: Arc<dyn PartTransport>,
        config: UploadConfig,
    ) -> Self {
        Self {
            coordinator,
            transport,
            items: Arc::new(DashMap::new()),
            events: EventBus::new(),
            config,
        }
    }

    /// 订阅任务事件流
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// 登记本地文件为上传任务，返回任务 ID
    pub async fn add_file(
        &self,
        path: impl AsRef<Path>,
        content_type: impl Into<String>,
    ) -> anyhow::Result<String> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        let content_type = content_type.into();

        let item = UploadItem::new(name.clone(), path.to_path_buf(), metadata.len(), content_type.clone());
        let item_id = item.id.clone();
        let total_size = item.total_size;

        self.items.insert(
            item_id.clone(),
            ItemRuntime {
                item: Arc::new(Mutex::new(item)),
                cancel_token: CancellationToken::new(),
                is_paused: Arc::new(AtomicBool::new(false)),
            },
        );

        info!("任务已创建: id={}, name={}, size={}", item_id, name, total_size);
        self.events.publish(UploadEvent::Created {
            item_id: item_id.clone(),
            name,
            total_size,
            content_type,
        });
        Ok(item_id)
    }

    /// 启动所有等待中的任务
    ///
    /// 每个任务独立驱动：先统一翻转为 uploading，再逐个派发引擎
    pub async fn start(&self) -> usize {
        let mut started = 0;

        let runtimes: Vec<(String, ItemRuntime)> = self
            .items
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (item_id, runtime) in runtimes {
            {
                let mut item = runtime.item.lock().await;
                if item.status != UploadItemStatus::Pending {
                    continue;
                }
                item.mark_uploading();
            }
            self.events.publish(UploadEvent::StatusChanged {
                item_id: item_id.clone(),
                old_status: UploadItemStatus::Pending.as_str().to_string(),
                new_status: UploadItemStatus::Uploading.as_str().to_string(),
            });

            self.spawn_engine(runtime);
            started += 1;
        }

        if started > 0 {
            info!("已启动 {} 个上传任务", started);
        }
        started
    }

    /// 重试失败的任务：清零进度、清空错误、重新申请凭证整体重传
    pub async fn retry(&self, item_id: &str) -> Result<(), UploadError> {
        let runtime = match self.items.get(item_id) {
            Some(entry) => entry.value().clone(),
            None => return Err(UploadError::Validation("itemId".to_string())),
        };

        {
            let mut item = runtime.item.lock().await;
            if item.status != UploadItemStatus::Error {
                warn!("任务 {} 非失败状态，忽略重试", item_id);
                return Ok(());
            }
            item.reset_for_retry();
        }

        // 旧令牌可能已触发，换新的
        let fresh = ItemRuntime {
            item: Arc::clone(&runtime.item),
            cancel_token: CancellationToken::new(),
            is_paused: Arc::clone(&runtime.is_paused),
        };
        self.items.insert(item_id.to_string(), fresh.clone());

        self.events.publish(UploadEvent::StatusChanged {
            item_id: item_id.to_string(),
            old_status: UploadItemStatus::Error.as_str().to_string(),
            new_status: UploadItemStatus::Uploading.as_str().to_string(),
        });

        info!("重试任务: {}", item_id);
        self.spawn_engine(fresh);
        Ok(())
    }

    /// 暂停单个任务（建议性，在尝试边界生效）
    pub fn pause(&self, item_id: &str) {
        if let Some(runtime) = self.items.get(item_id) {
            runtime.is_paused.store(true, Ordering::SeqCst);
            self.events.publish(UploadEvent::Paused {
                item_id: item_id.to_string(),
            });
        }
    }

    /// 恢复单个任务
    pub fn resume(&self, item_id: &str) {
        if let Some(runtime) = self.items.get(item_id) {
            runtime.is_paused.store(false, Ordering::SeqCst);
            self.events.publish(UploadEvent::Resumed {
                item_id: item_id.to_string(),
            });
        }
    }

    /// 暂停全部任务
    pub fn pause_all(&self) {
        for entry in self.items.iter() {
            entry.value().is_paused.store(true, Ordering::SeqCst);
            self.events.publish(UploadEvent::Paused {
                item_id: entry.key().clone(),
            });
        }
    }

    /// 恢复全部任务
    pub fn resume_all(&self) {
        for entry in self.items.iter() {
            entry.value().is_paused.store(false, Ordering::SeqCst);
            self.events.publish(UploadEvent::Resumed {
                item_id: entry.key().clone(),
            });
        }
    }

    /// 删除任务（取消其在途上传）
    pub fn remove(&self, item_id: &str) {
        if let Some((_, runtime)) = self.items.remove(item_id) {
            runtime.cancel_token.cancel();
            self.events.publish(UploadEvent::Deleted {
                item_id: item_id.to_string(),
            });
        }
    }

    /// 清空全部任务
    pub fn clear(&self) {
        let ids: Vec<String> = self.items.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove(&id);
        }
    }

    /// 任务快照
    pub async fn get(&self, item_id: &str) -> Option<UploadItem> {
        let runtime = self.items.get(item_id)?.value().clone();
        let item = runtime.item.lock().await.clone();
        Some(item)
    }

    /// 全部任务快照
    pub async fn list(&self) -> Vec<UploadItem> {
        let runtimes: Vec<ItemRuntime> =
            self.items.iter().map(|e| e.value().clone()).collect();
        let mut items = Vec::with_capacity(runtimes.len());
        for runtime in runtimes {
            items.push(runtime.item.lock().await.clone());
        }
        // 稳定展示顺序
        items.sort_by_key(|i| (i.created_at, i.id.clone()));
        items
    }

    /// 统计信息
    pub async fn stats(&self) -> UploadStats {
        let items = self.list().await;
        let mut stats = UploadStats {
            total: items.len(),
            ..Default::default()
        };
        for item in &items {
            stats.total_bytes += item.total_size;
            match item.status {
                UploadItemStatus::Pending => stats.pending += 1,
                UploadItemStatus::Uploading => stats.uploading += 1,
                UploadItemStatus::Success => stats.completed += 1,
                UploadItemStatus::Error => stats.failed += 1,
            }
        }
        stats
    }

    /// 是否还有可启动的任务
    pub async fn can_upload(&self) -> bool {
        // 不跨 await 持有 DashMap 分片锁
        let runtimes: Vec<ItemRuntime> =
            self.items.iter().map(|e| e.value().clone()).collect();
        for runtime in runtimes {
            if runtime.item.lock().await.status == UploadItemStatus::Pending {
                return true;
            }
        }
        false
    }

    /// 派发任务引擎
    fn spawn_engine(&self, runtime: ItemRuntime) {
        let engine = UploadEngine::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.transport),
            runtime.item,
            self.events.clone(),
            runtime.cancel_token,
            runtime.is_paused,
            self.config.clone(),
        );
        tokio::spawn(async move {
            engine.run().await;
        });
    }
}
