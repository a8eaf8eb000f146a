use s3_upload_rust::{config::LogConfig, logging, server, AppState};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// 加载日志配置
///
/// 尝试从配置文件加载，失败时使用默认配置
async fn load_log_config() -> LogConfig {
    let config_path = "config/app.toml";
    if let Ok(content) = tokio::fs::read_to_string(config_path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载日志配置，失败时使用默认配置
    let log_config = load_log_config().await;

    // 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&log_config);

    info!("S3 Upload Rust v0.3.0 启动中...");

    // 创建应用状态
    let app_state = AppState::new().await?;
    {
        let config = app_state.config.read().await;
        if !config.storage.is_configured() {
            tracing::warn!("对象存储未配置，上传接口将返回 500（请填写 config/app.toml 的 [storage] 节）");
        }
    }
    info!("应用状态初始化完成");

    let addr = {
        let config = app_state.config.read().await;
        format!("{}:{}", config.server.host, config.server.port)
    };

    // 配置中间件层
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http()) // HTTP 请求日志
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let app = server::api_router(app_state).layer(middleware);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("控制面已启动: http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
