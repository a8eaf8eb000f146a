//! 上传事件定义与发布
//!
//! 核心逻辑不直接感知任何展示层：状态与进度变化以类型化事件的形式
//! 发布到进程内广播通道，由订阅方（CLI、测试、未来的推送层）自行消费。
//! 进度事件频率高，发布前经过节流器控制。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// 默认事件通道容量
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// 默认进度节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 上传任务事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 任务创建
    Created {
        item_id: String,
        name: String,
        total_size: u64,
        content_type: String,
    },
    /// 进度更新（只统计已确认字节）
    Progress {
        item_id: String,
        uploaded_bytes: u64,
        total_size: u64,
        progress: u8,
    },
    /// 状态变更
    StatusChanged {
        item_id: String,
        old_status: String,
        new_status: String,
    },
    /// 任务完成（finalize 已确认）
    Completed {
        item_id: String,
        object_key: String,
        completed_at: i64,
    },
    /// 任务失败
    Failed { item_id: String, error: String },
    /// 任务暂停
    Paused { item_id: String },
    /// 任务恢复
    Resumed { item_id: String },
    /// 任务删除
    Deleted { item_id: String },
}

/// 事件总线
///
/// `broadcast` 通道的轻量封装：无订阅者时发布直接丢弃，不算错误
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<UploadEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    /// 发布事件
    pub fn publish(&self, event: UploadEvent) {
        // send 只在无接收者时失败，属正常情况
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 进度事件节流器
///
/// 线程安全的时间节流器，使用原子 CAS 避免锁竞争。
/// 典型用法：每次进度更新时调用 `should_emit()`，返回 true 时才发布事件
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 上次发布事件的时间戳（纳秒）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit_nanos: AtomicU64::new(0),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    /// 使用默认间隔（200ms）创建节流器
    pub fn default_interval() -> Self {
        Self::new(Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS))
    }

    /// 检查是否应该发布事件
    ///
    /// 距上次发布超过节流间隔时返回 true 并更新时间戳
    pub fn should_emit(&self) -> bool {
        // 0 保留为"从未发布"标记
        let now_nanos = Self::current_nanos().max(1);
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        if last != 0 && now_nanos.saturating_sub(last) < self.interval_nanos {
            return false;
        }

        // CAS 失败说明其他线程刚发布过，本次放弃
        self.last_emit_nanos
            .compare_exchange(last, now_nanos, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn current_nanos() -> u64 {
        // 进程内单调时钟基准
        use std::sync::OnceLock;
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }
}
