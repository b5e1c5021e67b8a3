//! End-to-end access-gate scenario (spec §8): a password-protected
//! broker rejects guarded routes until `/api/access/verify` succeeds,
//! and the returned cookie then authorizes subsequent requests.
//!
//! Follows the teacher's integration-test shape in
//! `tests/auth_integration.rs`: spawn the real router on an ephemeral
//! port, drive it with `reqwest`, assert on status codes.

use std::net::SocketAddr;

use serde_json::json;
use ssh_web_broker::config::Config;
use ssh_web_broker::AppState;

async fn spawn_server(access_password: Option<&str>) -> SocketAddr {
    let mut config = Config::from_env();
    config.access_password = access_password.map(str::to_string);
    config.token_secret = "integration-test-secret".to_string();
    config.credentials_path = std::env::temp_dir().join(format!(
        "ssh-web-broker-test-{}.enc",
        uuid::Uuid::new_v4()
    ));

    let state = AppState::build(config).expect("state builds");
    let app = ssh_web_broker::api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn guarded_route_requires_verification_then_succeeds() {
    let addr = spawn_server(Some("correct-horse")).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let client = reqwest::Client::builder().cookie_store(true).build().unwrap();
    let base = format!("http://{addr}");

    let unauthorized = client
        .get(format!("{base}/api/sessions"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), reqwest::StatusCode::UNAUTHORIZED);

    let verify = client
        .post(format!("{base}/api/access/verify"))
        .json(&json!({ "password": "correct-horse", "remember": true }))
        .send()
        .await
        .unwrap();
    assert!(verify.status().is_success());
    let body: serde_json::Value = verify.json().await.unwrap();
    assert_eq!(body["success"], true);

    let authorized = client
        .get(format!("{base}/api/sessions"))
        .send()
        .await
        .unwrap();
    assert!(authorized.status().is_success());
}

#[tokio::test]
async fn wrong_password_is_rejected_with_401() {
    let addr = spawn_server(Some("correct-horse")).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let verify = client
        .post(format!("{base}/api/access/verify"))
        .json(&json!({ "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(verify.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = verify.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn no_password_configured_leaves_gate_open() {
    let addr = spawn_server(None).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/sessions"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}
