//! 日志系统配置
//!
//! 支持控制台输出和文件持久化（按天滚动），启动时自动清理过期日志

use crate::config::LogConfig;
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 时间戳格式
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "s3-upload-rust";

/// 初始化日志系统
///
/// 返回的 `WorkerGuard` 必须在 main 中保持存活，否则文件日志会丢失
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    // 环境变量优先，其次取配置文件中的级别
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = fmt::layer()
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(false);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .init();
        return None;
    }

    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        // 目录创建失败时退化为纯控制台输出
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .init();
        tracing::warn!("创建日志目录失败，文件日志已禁用: {}", e);
        return None;
    }

    cleanup_old_logs(&config.log_dir, config.retention_days);

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Some(guard)
}

/// 清理超过保留天数的日志文件
///
/// 按文件修改时间判断，只处理本应用前缀的文件
fn cleanup_old_logs(log_dir: &Path, retention_days: u32) {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);
    let mut removed = 0usize;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<Local>::from);

        if let Ok(modified) = modified {
            if modified < cutoff && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
    }

    if removed > 0 {
        eprintln!("已清理 {} 个过期日志文件", removed);
    }
}
