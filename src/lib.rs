// S3 Upload Rust Library
// S3 兼容对象存储分片上传核心库

// 配置管理模块
pub mod config;

// 错误类型模块
pub mod error;

// 事件总线模块
pub mod events;

// 日志模块
pub mod logging;

// Web服务器模块（控制面 API）
pub mod server;

// 上传会话协调模块
pub mod session;

// 对象存储客户端模块（SigV4 签名/预签名）
pub mod storage;

// 分片上传核心模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, StorageConfig, UploadConfig};
pub use error::UploadError;
pub use events::{EventBus, ProgressThrottler, UploadEvent};
pub use server::AppState;
pub use session::{
    HttpPartTransport, HttpSessionCoordinator, PartResult, PartTransport, SessionCoordinator,
    UploadSession,
};
pub use storage::StorageClient;
pub use uploader::{
    PartTask, ProgressAggregator, UploadItem, UploadItemStatus, UploadManager, UploadPlan,
    UploadStats,
};
