// 上传引擎
//
// 驱动单个任务的完整上传流程：
// 1. 按文件大小生成上传计划（分片大小 + 并发数）
// 2. initiate 建立会话
// 3. 有界并发驱动各分片上传（凭证按需获取）
// 4. 全部分片成功后按分片序号重排结果，调用 finalize
// 5. finalize 确认后进度强制 100
//
// finalize 失败时任务标记为失败、会话保留，不自动 abort

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::events::{EventBus, ProgressThrottler, UploadEvent};
use crate::session::{PartResult, PartTransport, SessionCoordinator};
use crate::uploader::limiter::run_limited;
use crate::uploader::part::PartUploader;
use crate::uploader::planner::UploadPlan;
use crate::uploader::progress::ProgressAggregator;
use crate::uploader::task::UploadItem;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 上传引擎
///
/// 每个任务一个实例；暂停/取消经共享标志与令牌传入各分片
pub struct UploadEngine {
    coordinator: Arc<dyn SessionCoordinator>,
    transport: Arc<dyn PartTransport>,
    item: Arc<Mutex<UploadItem>>,
    events: EventBus,
    cancel_token: CancellationToken,
    is_paused: Arc<AtomicBool>,
    config: UploadConfig,
}

impl UploadEngine {
    pub fn new(
        coordinator: Arc<dyn SessionCoordinator>,
        transport: Arc<dyn PartTransport>,
        item: Arc<Mutex<UploadItem>>,
        events: EventBus,
        cancel_token: CancellationToken,
        is_paused: Arc<AtomicBool>,
        config: UploadConfig,
    ) -> Self {
        Self {
            coordinator,
            transport,
            item,
            events,
            cancel_token,
            is_paused,
            config,
        }
    }

    /// 执行上传，终态（成功/失败）写回任务并发布事件
    pub async fn run(&self) {
        let (item_id, name) = {
            let item = self.item.lock().await;
            (item.id.clone(), item.name.clone())
        };

        match self.upload().await {
            Ok(object_key) => {
                let completed_at = {
                    let mut item = self.item.lock().await;
                    item.object_key = Some(object_key.clone());
                    item.mark_success();
                    item.completed_at.unwrap_or_default()
                };
                info!("上传完成: {} -> {}", name, object_key);
                self.events.publish(UploadEvent::Completed {
                    item_id,
                    object_key,
                    completed_at,
                });
            }
            Err(e) => {
                let message = e.to_string();
                warn!("上传失败: {}: {}", name, message);
                self.item.lock().await.mark_failed(message.clone());
                self.events.publish(UploadEvent::Failed {
                    item_id,
                    error: message,
                });
            }
        }
    }

    /// 上传主流程，成功返回对象键
    async fn upload(&self) -> Result<String, UploadError> {
        let (item_id, name, content_type, source_path, total_size) = {
            let item = self.item.lock().await;
            (
                item.id.clone(),
                item.name.clone(),
                item.content_type.clone(),
                item.source_path.clone(),
                item.total_size,
            )
        };

        let plan = match self.config.chunk_size_override_mb {
            Some(mb) => {
                UploadPlan::with_chunk_size(total_size, (mb * 1024 * 1024).max(1), 2)
            }
            None => UploadPlan::for_size(total_size),
        };
        let parts = plan.split();

        info!(
            "开始上传: {}, 大小={} bytes, 分片数={}, 分片大小={} bytes, 并发={}",
            name,
            total_size,
            parts.len(),
            plan.chunk_size,
            plan.concurrency
        );

        // 每次上传（含重试）都走 initiate 拿全新会话与凭证
        let session = self.coordinator.initiate(&name, &content_type).await?;
        {
            let mut item = self.item.lock().await;
            item.object_key = Some(session.object_key.clone());
        }

        let progress = Arc::new(ProgressAggregator::new(total_size));
        let throttler = Arc::new(ProgressThrottler::default_interval());
        let part_uploader = Arc::new(PartUploader::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.transport),
            Arc::clone(&progress),
            self.cancel_token.clone(),
            Arc::clone(&self.is_paused),
            &self.config,
        ));

        // 每个分片一个任务闭包，交给有界并发执行器；
        // 结果按输入顺序返回，但完成顺序不确定
        let tasks: Vec<_> = parts
            .into_iter()
            .map(|part| {
                let part_uploader = Arc::clone(&part_uploader);
                let session = session.clone();
                let source_path = source_path.clone();
                let progress = Arc::clone(&progress);
                let throttler = Arc::clone(&throttler);
                let events = self.events.clone();
                let item = Arc::clone(&self.item);
                let item_id = item_id.clone();

                move || async move {
                    let result = part_uploader.upload_part(&session, &source_path, &part).await?;

                    // 确认成功后刷新任务进度并发布节流后的进度事件
                    let percent = progress.percent();
                    item.lock().await.set_progress(percent);
                    if throttler.should_emit() {
                        events.publish(UploadEvent::Progress {
                            item_id,
                            uploaded_bytes: progress.uploaded_bytes(),
                            total_size,
                            progress: percent,
                        });
                    }
                    Ok(result)
                }
            })
            .collect();

        let mut results: Vec<PartResult> = run_limited(plan.concurrency, tasks).await?;

        // 完成顺序不确定，finalize 载荷必须按分片序号升序
        results.sort_by_key(|r| r.part_number);

        // finalize 失败时不自动 abort，会话留给调用方显式清理
        self.coordinator.finalize(&session, &results).await?;

        // 后端确认完成后才允许 100%
        progress.mark_finalized();
        self.item.lock().await.set_progress(100);
        self.events.publish(UploadEvent::Progress {
            item_id,
            uploaded_bytes: progress.uploaded_bytes(),
            total_size,
            progress: 100,
        });

        Ok(session.object_key)
    }
}
