//! Integration tests for the front-end router.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use ceres_core::{CCompiler, Compiler, ExecutionConfig, ExecutionController, RelayTable};
use ceres_server::{AppState, KernelSession, create_router};
use tower::ServiceExt;

fn state() -> Arc<AppState> {
    let compiler: Arc<dyn Compiler> = Arc::new(CCompiler::default());
    let controller =
        ExecutionController::new(compiler, RelayTable::new(), ExecutionConfig::default()).unwrap();
    Arc::new(AppState {
        session: Arc::new(KernelSession::new(controller)),
        relay_url: "http://127.0.0.1:41000/".to_string(),
    })
}

#[tokio::test]
async fn test_health() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = create_router(state()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["busy"], false);
    assert_eq!(json["execution_count"], 0);
    assert_eq!(json["relay_url"], "http://127.0.0.1:41000/");
}

#[tokio::test]
async fn test_index_page() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = create_router(state()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("/ws"));
}

#[tokio::test]
async fn test_ws_requires_upgrade() {
    let request = Request::builder().uri("/ws").body(Body::empty()).unwrap();
    let response = create_router(state()).oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}
