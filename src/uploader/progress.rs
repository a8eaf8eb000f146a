// 进度聚合
//
// 只累计已确认的分片字节（拿到完整性令牌才算数，不统计在途字节）。
// 百分比在会话 finalize 确认前封顶 99，确认后强制 100：
// 消费方永远不会在后端确认完成之前看到 100%

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 进度封顶值（finalize 确认前）
const PROGRESS_CAP: u8 = 99;

/// 单任务进度聚合器
#[derive(Debug)]
pub struct ProgressAggregator {
    /// 文件总大小
    total_size: u64,
    /// 已确认字节数
    uploaded_bytes: AtomicU64,
    /// 会话是否已持久化完成
    finalized: AtomicBool,
}

impl ProgressAggregator {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            uploaded_bytes: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        }
    }

    /// 记录一个已确认分片的字节数
    ///
    /// 每个成功分片只允许上报一次，进度累加可交换，分片间无顺序约束
    pub fn record_part(&self, bytes: u64) {
        self.uploaded_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// 已确认字节数
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::SeqCst)
    }

    /// 标记会话已完成（finalize 成功后调用）
    pub fn mark_finalized(&self) {
        self.finalized.store(true, Ordering::SeqCst);
    }

    /// 当前进度百分比
    ///
    /// `floor(uploaded / total * 100)`，finalize 前封顶 99，之后恒为 100
    pub fn percent(&self) -> u8 {
        if self.finalized.load(Ordering::SeqCst) {
            return 100;
        }
        if self.total_size == 0 {
            return 0;
        }
        let uploaded = self.uploaded_bytes.load(Ordering::SeqCst);
        let percent = (uploaded as u128 * 100 / self.total_size as u128) as u8;
        percent.min(PROGRESS_CAP)
    }
}
