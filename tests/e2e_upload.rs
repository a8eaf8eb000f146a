// 端到端上传测试
//
// 进程内起一个模拟控制面 + 分片落盘端点，走真实 HTTP 路径
// 验证完整生命周期：initiate → 并发分片 PUT → finalize

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use s3_upload_rust::{
    AppConfig, HttpPartTransport, HttpSessionCoordinator, UploadConfig, UploadItemStatus,
    UploadManager,
};

/// 模拟后端：记录分片字节与 finalize 清单
struct MockBackend {
    base_url: Mutex<String>,
    /// part_number -> 收到的字节数
    parts: Mutex<HashMap<u32, usize>>,
    /// finalize 收到的 (partNumber, integrityToken) 清单
    finalized: Mutex<Option<Vec<(u32, String)>>>,
    credential_calls: AtomicU32,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            base_url: Mutex::new(String::new()),
            parts: Mutex::new(HashMap::new()),
            finalized: Mutex::new(None),
            credential_calls: AtomicU32::new(0),
        }
    }
}

async fn mock_initiate(Json(req): Json<Value>) -> Json<Value> {
    let name = req["name"].as_str().unwrap_or_default();
    Json(json!({
        "sessionId": "mock-session-1",
        "objectKey": format!("uploads/{}", name),
    }))
}

async fn mock_credential(
    State(backend): State<Arc<MockBackend>>,
    Json(req): Json<Value>,
) -> Json<Value> {
    backend.credential_calls.fetch_add(1, Ordering::SeqCst);
    let base = backend.base_url.lock().unwrap().clone();
    let urls: Vec<Value> = req["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|p| p.as_u64())
        .map(|p| json!({ "partNumber": p, "signedUrl": format!("{}/blob/{}", base, p) }))
        .collect();
    Json(json!({ "urls": urls }))
}

async fn mock_put_blob(
    State(backend): State<Arc<MockBackend>>,
    Path(part_number): Path<u32>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    backend
        .parts
        .lock()
        .unwrap()
        .insert(part_number, body.len());
    (
        [(header::ETAG, format!("\"etag-{}\"", part_number))],
        "ok",
    )
}

async fn mock_finalize(
    State(backend): State<Arc<MockBackend>>,
    Json(req): Json<Value>,
) -> Json<Value> {
    let parts: Vec<(u32, String)> = req["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|p| {
            (
                p["partNumber"].as_u64().unwrap() as u32,
                p["integrityToken"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    *backend.finalized.lock().unwrap() = Some(parts);
    Json(json!({ "ok": true }))
}

async fn mock_abort() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// 启动模拟后端，返回 (控制面基础 URL, 后端句柄)
async fn spawn_mock_backend() -> (String, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());

    let app = Router::new()
        .route("/api/v1/uploads/initiate", post(mock_initiate))
        .route("/api/v1/uploads/credential", post(mock_credential))
        .route("/api/v1/uploads/finalize", post(mock_finalize))
        .route("/api/v1/uploads/abort", post(mock_abort))
        .route("/blob/:part", put(mock_put_blob))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    *backend.base_url.lock().unwrap() = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api/v1", addr), backend)
}

fn manager_for(base_url: &str, config: UploadConfig) -> UploadManager {
    let client = reqwest::Client::new();
    let coordinator = Arc::new(HttpSessionCoordinator::new(client.clone(), base_url));
    let transport = Arc::new(HttpPartTransport::new(client));
    UploadManager::new(coordinator, transport, config)
}

fn temp_file(len: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![7u8; len]).unwrap();
    file.flush().unwrap();
    file
}

async fn wait_terminal(manager: &UploadManager, item_id: &str) -> s3_upload_rust::UploadItem {
    for _ in 0..300 {
        if let Some(item) = manager.get(item_id).await {
            if item.status.is_terminal() {
                return item;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("任务未在限时内到达终态");
}

#[tokio::test]
async fn test_single_part_upload_end_to_end() {
    let (base_url, backend) = spawn_mock_backend().await;
    let manager = manager_for(&base_url, UploadConfig::default());

    let file = temp_file(4096);
    let id = manager.add_file(file.path(), "application/octet-stream").await.unwrap();
    manager.start().await;

    let item = wait_terminal(&manager, &id).await;
    assert_eq!(item.status, UploadItemStatus::Success);
    assert_eq!(item.progress, 100);
    assert!(item.object_key.as_deref().unwrap().starts_with("uploads/"));

    // 单分片：全部字节走一个 PUT
    let parts = backend.parts.lock().unwrap().clone();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[&1], 4096);

    // finalize 清单携带该分片的令牌
    let finalized = backend.finalized.lock().unwrap().clone().unwrap();
    assert_eq!(finalized, vec![(1, "etag-1".to_string())]);
}

#[tokio::test]
async fn test_multipart_upload_finalize_sorted() {
    let (base_url, backend) = spawn_mock_backend().await;
    let config = UploadConfig {
        chunk_size_override_mb: Some(1),
        backoff_base_ms: 1,
        backoff_cap_ms: 2,
        ..UploadConfig::default()
    };
    let manager = manager_for(&base_url, config);

    // 3MiB + 1MiB 分片 ⇒ 3 个分片，并发 2
    let file = temp_file(3 * 1024 * 1024);
    let id = manager.add_file(file.path(), "video/mp4").await.unwrap();
    manager.start().await;

    let item = wait_terminal(&manager, &id).await;
    assert_eq!(item.status, UploadItemStatus::Success);
    assert_eq!(item.progress, 100);

    // 每个分片恰好 1MiB
    let parts = backend.parts.lock().unwrap().clone();
    assert_eq!(parts.len(), 3);
    for n in 1..=3u32 {
        assert_eq!(parts[&n], 1024 * 1024, "分片 {} 字节数不符", n);
    }

    // finalize 清单按分片号升序
    let finalized = backend.finalized.lock().unwrap().clone().unwrap();
    let numbers: Vec<u32> = finalized.iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    for (n, token) in &finalized {
        assert_eq!(token, &format!("etag-{}", n));
    }

    // 凭证按需逐分片申请
    assert_eq!(backend.credential_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_control_plane_validation_over_http() {
    // 真实控制面路由：未配置存储时的行为
    let state = s3_upload_rust::AppState::with_config(AppConfig::default()).unwrap();
    let app = s3_upload_rust::server::api_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let base = format!("http://{}/api/v1", addr);

    // 缺少 name → 400，带 {error}
    let response = client
        .post(format!("{}/uploads/initiate", base))
        .json(&json!({ "contentType": "video/mp4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("name"));

    // 字段齐全但存储未配置 → 500
    let response = client
        .post(format!("{}/uploads/initiate", base))
        .json(&json!({ "name": "video.mp4", "contentType": "video/mp4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);

    // credential 缺 sessionId → 400，且在触达后端前返回
    let response = client
        .post(format!("{}/uploads/credential", base))
        .json(&json!({ "objectKey": "uploads/a.bin", "parts": [1] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
