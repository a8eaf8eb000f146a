// Web服务器模块

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

/// 构建控制面路由
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/uploads/initiate", post(handlers::initiate_upload))
        .route(
            "/api/v1/uploads/credential",
            post(handlers::issue_credentials),
        )
        .route("/api/v1/uploads/finalize", post(handlers::finalize_upload))
        .route("/api/v1/uploads/abort", post(handlers::abort_upload))
        .route("/api/v1/health", get(|| async { "ok" }))
        .with_state(state)
}
