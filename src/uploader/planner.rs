// 上传计划
//
// 根据文件大小推导分片大小与并发数：
// - 小文件整体单分片上传，避免分片开销
// - 并发上限 2，约束同时存在的凭证签发量和传输连接数
//
// 大小分档：
// - < 25MB：单分片（分片大小 = 文件大小），并发 1
// - 25–100MB：25MB 分片，并发 2
// - 100–500MB：50MB 分片，并发 2
// - >= 500MB：100MB 分片，并发 2

use crate::error::UploadError;
use std::ops::Range;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 小文件阈值: 25MB
pub const SMALL_FILE_THRESHOLD: u64 = 25 * 1024 * 1024;

/// 中等文件阈值: 100MB
pub const MEDIUM_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// 大文件阈值: 500MB
pub const LARGE_FILE_THRESHOLD: u64 = 500 * 1024 * 1024;

/// 最小分片大小: 25MB
pub const MIN_CHUNK_SIZE: u64 = 25 * 1024 * 1024;

/// 中等分片大小: 50MB
pub const MEDIUM_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// 最大分片大小: 100MB
pub const LARGE_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// 单分片上传并发数
const SINGLE_CONCURRENT: usize = 1;

/// 多分片上传并发数上限
const LOW_CONCURRENT: usize = 2;

/// 上传计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    /// 文件总大小
    pub total_size: u64,
    /// 分片大小
    pub chunk_size: u64,
    /// 最大并发分片数
    pub concurrency: usize,
}

impl UploadPlan {
    /// 根据文件大小推导上传计划
    pub fn for_size(total_size: u64) -> Self {
        let (chunk_size, concurrency) = if total_size < SMALL_FILE_THRESHOLD {
            (total_size, SINGLE_CONCURRENT)
        } else if total_size < MEDIUM_FILE_THRESHOLD {
            (MIN_CHUNK_SIZE, LOW_CONCURRENT)
        } else if total_size < LARGE_FILE_THRESHOLD {
            (MEDIUM_CHUNK_SIZE, LOW_CONCURRENT)
        } else {
            (LARGE_CHUNK_SIZE, LOW_CONCURRENT)
        };

        Self::with_chunk_size(total_size, chunk_size, concurrency)
    }

    /// 指定分片大小创建上传计划（调优/测试用）
    ///
    /// 并发数仍会被分片总数收紧
    pub fn with_chunk_size(total_size: u64, chunk_size: u64, concurrency: usize) -> Self {
        let plan = Self {
            total_size,
            chunk_size,
            concurrency,
        };
        // 单分片时不需要并发
        let total_parts = plan.total_parts();
        Self {
            concurrency: concurrency.min(total_parts).max(1),
            ..plan
        }
    }

    /// 分片总数，恒 >= 1
    pub fn total_parts(&self) -> usize {
        if self.total_size == 0 || self.chunk_size == 0 {
            return 1;
        }
        self.total_size.div_ceil(self.chunk_size) as usize
    }

    /// 切分为分片任务列表
    ///
    /// 分片序号从 1 开始、连续无空洞，字节范围 [start, end) 覆盖整个文件
    pub fn split(&self) -> Vec<PartTask> {
        if self.total_size == 0 {
            // 空文件：单个空分片
            return vec![PartTask::new(1, 0..0)];
        }

        let mut parts = Vec::with_capacity(self.total_parts());
        let mut offset = 0u64;
        let mut part_number = 1u32;

        while offset < self.total_size {
            let end = std::cmp::min(offset + self.chunk_size, self.total_size);
            parts.push(PartTask::new(part_number, offset..end));
            offset = end;
            part_number += 1;
        }

        parts
    }
}

/// 分片任务
///
/// 由计划切分产生，成功或重试耗尽后销毁
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTask {
    /// 分片序号（1 起始，连续且唯一）
    pub part_number: u32,
    /// 字节范围 [start, end)
    pub range: Range<u64>,
}

impl PartTask {
    pub fn new(part_number: u32, range: Range<u64>) -> Self {
        Self { part_number, range }
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 从本地文件读取分片数据
    pub async fn read_data(&self, file_path: &Path) -> Result<Vec<u8>, UploadError> {
        let mut file = File::open(file_path)
            .await
            .map_err(|e| UploadError::Transfer(format!("打开上传文件失败: {}", e)))?;

        file.seek(std::io::SeekFrom::Start(self.range.start))
            .await
            .map_err(|e| UploadError::Transfer(format!("文件定位失败: {}", e)))?;

        let mut buffer = vec![0u8; self.size() as usize];
        file.read_exact(&mut buffer)
            .await
            .map_err(|e| UploadError::Transfer(format!("读取分片数据失败: {}", e)))?;

        debug!(
            "读取分片 #{}: bytes={}-{}, 大小={} bytes",
            self.part_number,
            self.range.start,
            self.range.end,
            buffer.len()
        );

        Ok(buffer)
    }
}
