// 上传任务（单个文件条目）定义

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// 上传任务状态
///
/// 合法迁移：pending → uploading → {success, error}；
/// 仅显式 retry 允许从 error 回到 uploading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadItemStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Success,
    /// 失败
    Error,
}

impl UploadItemStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadItemStatus::Success | UploadItemStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadItemStatus::Pending => "pending",
            UploadItemStatus::Uploading => "uploading",
            UploadItemStatus::Success => "success",
            UploadItemStatus::Error => "error",
        }
    }
}

/// 上传任务
///
/// 文件选定时创建，只由编排器修改，显式删除/清空时销毁
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItem {
    /// 任务ID
    pub id: String,
    /// 文件名（上传后的对象名）
    pub name: String,
    /// 本地文件路径
    pub source_path: PathBuf,
    /// 文件大小
    pub total_size: u64,
    /// 内容类型
    pub content_type: String,
    /// 任务状态
    pub status: UploadItemStatus,
    /// 进度百分比 [0, 100]
    pub progress: u8,
    /// 错误信息
    pub error: Option<String>,
    /// 会话对象键（initiate 之后可用）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
}

impl UploadItem {
    /// 创建新的上传任务
    pub fn new(name: String, source_path: PathBuf, total_size: u64, content_type: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            source_path,
            total_size,
            content_type,
            status: UploadItemStatus::Pending,
            progress: 0,
            error: None,
            object_key: None,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        self.status = UploadItemStatus::Uploading;
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 标记为已完成（finalize 已确认，进度强制 100）
    pub fn mark_success(&mut self) {
        self.status = UploadItemStatus::Success;
        self.progress = 100;
        self.error = None;
        self.completed_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        self.status = UploadItemStatus::Error;
        self.error = Some(error);
    }

    /// 更新进度（只允许前进，finalize 的强制跳变除外）
    pub fn set_progress(&mut self, progress: u8) {
        if progress > self.progress {
            self.progress = progress.min(100);
        }
    }

    /// 重置以便重试：清空进度与错误，重新进入上传中
    pub fn reset_for_retry(&mut self) {
        self.progress = 0;
        self.error = None;
        self.object_key = None;
        self.completed_at = None;
        self.status = UploadItemStatus::Uploading;
    }
}
