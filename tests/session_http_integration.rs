//! HTTP surface scenarios for credentials and sessions (spec §8):
//! credentials persist across vault reopen, and connecting to an
//! unreachable host yields a session in `error` status rather than an
//! HTTP failure (the broker always creates the registry entry; the SSH
//! handshake's outcome is reported asynchronously via status).

use std::net::SocketAddr;

use serde_json::json;
use ssh_web_broker::config::Config;
use ssh_web_broker::AppState;

async fn spawn_server() -> (SocketAddr, std::path::PathBuf) {
    let mut config = Config::from_env();
    config.access_password = None;
    config.token_secret = "integration-test-secret".to_string();
    let creds_path = std::env::temp_dir().join(format!(
        "ssh-web-broker-test-{}.enc",
        uuid::Uuid::new_v4()
    ));
    config.credentials_path = creds_path.clone();

    let state = AppState::build(config).expect("state builds");
    let app = ssh_web_broker::api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, creds_path)
}

#[tokio::test]
async fn credential_create_list_delete_round_trip() {
    let (addr, _path) = spawn_server().await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let created: serde_json::Value = client
        .post(format!("{base}/api/credentials"))
        .json(&json!({
            "id": "c1",
            "host": "example.com",
            "port": 22,
            "username": "alice",
            "authType": "password",
            "password": "hunter2",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["success"], true);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(id, "c1");

    let list: serde_json::Value = client
        .get(format!("{base}/api/credentials"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["credentials"].as_array().unwrap().len(), 1);
    assert!(!serde_json::to_string(&list).unwrap().contains("hunter2"));

    let exists: serde_json::Value = client
        .get(format!("{base}/api/credentials/{id}/exists"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(exists["exists"], true);

    let fetched: serde_json::Value = client
        .get(format!("{base}/api/credentials/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["password"], "hunter2");

    let deleted = client
        .delete(format!("{base}/api/credentials/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn connecting_to_unreachable_host_reports_error_status_not_http_failure() {
    let (addr, _path) = spawn_server().await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let created: serde_json::Value = client
        .post(format!("{base}/api/sessions"))
        .json(&json!({
            "host": "127.0.0.1",
            "port": 1,
            "username": "nobody",
            "authType": "password",
            "password": "x",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(created["status"], "error");

    let id = created["sessionId"].as_str().unwrap();
    let status: serde_json::Value = client
        .get(format!("{base}/api/sessions/{id}/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "error");

    let deleted = client
        .delete(format!("{base}/api/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);

    let beacon = client
        .post(format!("{base}/api/sessions/{id}/disconnect"))
        .send()
        .await
        .unwrap();
    assert!(beacon.status().is_success());
}
