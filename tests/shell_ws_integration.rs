//! WebSocket surface scenario (spec §8): `ping` echoes back regardless
//! of whether the session exists (it never binds), while `input` against
//! an unknown session id yields an error frame instead of silently
//! hanging the connection open.

use futures::{SinkExt, StreamExt};
use ssh_web_broker::config::Config;
use ssh_web_broker::AppState;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn ping_gets_pong_without_a_bound_session() {
    let mut config = Config::from_env();
    config.access_password = None;
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
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    ws.send(Message::Text(
        r#"{"type":"ping","sessionId":"does-not-exist"}"#.to_string(),
    ))
    .await
    .unwrap();

    let frame = ws.next().await.expect("server sends a frame").unwrap();
    let Message::Text(text) = frame else {
        panic!("expected a text frame");
    };
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["type"], "pong");
    assert_eq!(parsed["sessionId"], "does-not-exist");
}

#[tokio::test]
async fn unknown_session_id_on_input_gets_error_frame() {
    let mut config = Config::from_env();
    config.access_password = None;
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
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    ws.send(Message::Text(
        r#"{"type":"input","sessionId":"does-not-exist","data":"bHMK"}"#.to_string(),
    ))
    .await
    .unwrap();

    let frame = ws.next().await.expect("server sends a frame").unwrap();
    let Message::Text(text) = frame else {
        panic!("expected a text frame");
    };
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["type"], "error");
    assert_eq!(parsed["sessionId"], "does-not-exist");
}
