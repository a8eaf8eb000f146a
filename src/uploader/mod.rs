// 分片上传核心模块

pub mod engine;
pub mod limiter;
pub mod manager;
pub mod part;
pub mod planner;
pub mod progress;
pub mod retry;
pub mod task;

pub use engine::UploadEngine;
pub use limiter::run_limited;
pub use manager::{UploadManager, UploadStats};
pub use part::PartUploader;
pub use planner::{PartTask, UploadPlan};
pub use progress::ProgressAggregator;
pub use task::{UploadItem, UploadItemStatus};
