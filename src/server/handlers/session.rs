// 上传会话 API
//
// 四个接口构成控制面契约：initiate / credential / finalize / abort。
// 所有接口在触达存储后端之前先做参数校验：缺字段一律 400，
// 存储未配置一律 500，不发出任何后端请求

use crate::server::error::{ApiError, ApiResult};
use crate::session::PartResult;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::server::AppState;

/// POST /api/v1/uploads/initiate 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// initiate 响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub session_id: String,
    pub object_key: String,
}

/// POST /api/v1/uploads/credential 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub parts: Vec<u32>,
}

/// credential 响应中的单个分片凭证
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPartUrl {
    pub part_number: u32,
    pub signed_url: String,
}

/// credential 响应
#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub urls: Vec<SignedPartUrl>,
}

/// POST /api/v1/uploads/finalize 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub parts: Vec<PartResult>,
}

/// POST /api/v1/uploads/abort 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
}

/// 取出必填字段，缺失或为空返回 400
fn require(value: Option<String>, field: &str) -> ApiResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::missing_field(field)),
    }
}

/// 存储未配置时直接 500，不发出后端请求
async fn ensure_storage_configured(state: &AppState) -> ApiResult<()> {
    let config = state.config.read().await;
    if !config.storage.is_configured() {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "对象存储未配置（缺少 bucket/endpoint）"
        )));
    }
    Ok(())
}

/// POST /api/v1/uploads/initiate
/// 发起分片上传会话
pub async fn initiate_upload(
    State(state): State<AppState>,
    Json(req): Json<InitiateRequest>,
) -> ApiResult<Json<InitiateResponse>> {
    let name = require(req.name, "name")?;
    ensure_storage_configured(&state).await?;

    // 对象键带毫秒时间戳前缀，同名文件互不覆盖
    let object_key = format!("uploads/{}-{}", chrono::Utc::now().timestamp_millis(), name);
    let session_id = state.storage.create_session(&object_key).await?;

    info!("发起上传: name={}, object_key={}", name, object_key);
    Ok(Json(InitiateResponse {
        session_id,
        object_key,
    }))
}

/// POST /api/v1/uploads/credential
/// 为请求的分片签发预签名 PUT URL
pub async fn issue_credentials(
    State(state): State<AppState>,
    Json(req): Json<CredentialRequest>,
) -> ApiResult<Json<CredentialResponse>> {
    let session_id = require(req.session_id, "sessionId")?;
    let object_key = require(req.object_key, "objectKey")?;
    if req.parts.is_empty() {
        return Err(ApiError::missing_field("parts"));
    }
    ensure_storage_configured(&state).await?;

    let mut urls = Vec::with_capacity(req.parts.len());
    for part_number in req.parts {
        let signed_url = state
            .storage
            .presign_part(&object_key, &session_id, part_number)?;
        urls.push(SignedPartUrl {
            part_number,
            signed_url,
        });
    }

    Ok(Json(CredentialResponse { urls }))
}

/// POST /api/v1/uploads/finalize
/// 合并完成分片上传
pub async fn finalize_upload(
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = require(req.session_id, "sessionId")?;
    let object_key = require(req.object_key, "objectKey")?;
    if req.parts.is_empty() {
        return Err(ApiError::missing_field("parts"));
    }
    ensure_storage_configured(&state).await?;

    state
        .storage
        .complete_session(&object_key, &session_id, &req.parts)
        .await?;

    info!("上传已完成: object_key={}", object_key);
    Ok(Json(json!({ "ok": true, "objectKey": object_key })))
}

/// POST /api/v1/uploads/abort
/// 中止分片上传会话
pub async fn abort_upload(
    State(state): State<AppState>,
    Json(req): Json<AbortRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = require(req.session_id, "sessionId")?;
    let object_key = require(req.object_key, "objectKey")?;
    ensure_storage_configured(&state).await?;

    state.storage.abort_session(&object_key, &session_id).await?;

    info!("上传已中止: object_key={}", object_key);
    Ok(Json(json!({ "ok": true })))
}
