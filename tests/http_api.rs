//! Integration tests driving the axum router in-process via
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use cmux_remote::broadcaster::StateBroadcaster;
use cmux_remote::host::StaticHostBridge;
use cmux_remote::http::{build_router, AppState};
use cmux_remote::pty::PtyManager;
use cmux_remote::tmux::TmuxRegistry;
use cmux_remote::Config;

fn test_state(port: u16) -> AppState {
    let host = Arc::new(StaticHostBridge::demo());
    let pty_manager = Arc::new(PtyManager::default());
    let tmux = Arc::new(TmuxRegistry::new("tmux".to_string()));
    let broadcaster = Arc::new(StateBroadcaster::new(
        host.clone(),
        pty_manager.clone(),
        tmux.clone(),
    ));
    let mut config = Config::default();
    config.port = port;
    AppState::new(config, host, pty_manager, tmux, broadcaster)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_reports_configured_port() {
    let router = build_router(test_state(4999));
    let response = router
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["port"], 4999);
    assert_eq!(json["workspaceCount"], 1);
}

#[tokio::test]
async fn list_workspaces_returns_demo_workspace() {
    let router = build_router(test_state(4848));
    let response = router
        .oneshot(Request::builder().uri("/api/workspaces").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], "demo");
}

#[tokio::test]
async fn command_endpoint_bridges_to_host() {
    let router = build_router(test_state(4848));
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/command")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"method":"noop"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn malformed_command_body_is_rejected() {
    let router = build_router(test_state(4848));
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/command")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tmux_sessions_endpoint_returns_empty_list_without_tmux() {
    let router = build_router(test_state(4848));
    let response = router
        .oneshot(Request::builder().uri("/api/tmux/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn index_serves_embedded_html_shell() {
    let router = build_router(test_state(4848));
    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("cmux-remote"));
}
