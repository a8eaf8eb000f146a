// 命令行上传工具
//
// 用法: upload <控制面地址> <文件路径>...
// 例如: upload http://127.0.0.1:8080/api/v1 ./video.mp4 ./photo.jpg

use s3_upload_rust::{
    AppConfig, HttpPartTransport, HttpSessionCoordinator, UploadEvent, UploadItemStatus,
    UploadManager,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

fn usage() -> ! {
    eprintln!("用法: upload <控制面地址> <文件路径>...");
    eprintln!("例如: upload http://127.0.0.1:8080/api/v1 ./video.mp4");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let base_url = match args.next() {
        Some(url) if url.starts_with("http") => url,
        _ => usage(),
    };
    let paths: Vec<String> = args.collect();
    if paths.is_empty() {
        usage();
    }

    let config = AppConfig::load_or_default("config/app.toml").await;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upload.part_timeout_secs + 30))
        .build()?;

    let coordinator = Arc::new(HttpSessionCoordinator::new(client.clone(), base_url));
    let transport = Arc::new(HttpPartTransport::new(client));
    let manager = UploadManager::new(coordinator, transport, config.upload);

    for path in &paths {
        let content_type = guess_content_type(path);
        manager.add_file(path, content_type).await?;
    }

    // 事件输出
    let mut events = manager.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                UploadEvent::Progress {
                    item_id, progress, ..
                } => println!("[{}] {}%", &item_id[..8], progress),
                UploadEvent::Completed {
                    item_id,
                    object_key,
                    ..
                } => println!("[{}] 完成 -> {}", &item_id[..8], object_key),
                UploadEvent::Failed { item_id, error } => {
                    error!("[{}] 失败: {}", &item_id[..8], error)
                }
                _ => {}
            }
        }
    });

    manager.start().await;

    // 等待全部任务到达终态
    let stats = loop {
        let stats = manager.stats().await;
        if stats.pending == 0 && stats.uploading == 0 {
            break stats;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    };
    printer.abort();

    println!(
        "共 {} 个任务: 成功 {}, 失败 {}",
        stats.total, stats.completed, stats.failed
    );
    for item in manager.list().await {
        if item.status == UploadItemStatus::Error {
            eprintln!(
                "  失败: {} ({})",
                item.name,
                item.error.unwrap_or_else(|| "未知错误".into())
            );
        }
    }

    if stats.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// 按扩展名猜测内容类型，未知类型回退为二进制流
fn guess_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
