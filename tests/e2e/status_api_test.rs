#[allow(dead_code, unused_imports)]
mod helpers;
use helpers::*;

use tokio::time::{sleep, Duration};

// ---------------------------------------------------------------------------
// /api/stats
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_stats_empty() {
    let dir = tempfile::TempDir::new().unwrap();
    let relay = start_relay(relay_config(22, dir.path().join("absent_key"))).await;

    let resp = reqwest::get(relay.http_url("/api/stats")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["activeConnections"], 0);
    assert_eq!(body["connections"], serde_json::json!([]));
}

#[tokio::test]
async fn test_stats_lists_live_session() {
    let ssh = start_echo_ssh(None).await;
    let dir = tempfile::TempDir::new().unwrap();
    let relay = start_relay(relay_config(ssh.port, dir.path().join("absent_key"))).await;

    let mut ws = ws_connect(&relay.ws_url(
        "host=127.0.0.1&username=testuser&usePassword=true&password=secret",
    ))
    .await;
    read_until(&mut ws, "SSH connection established", Duration::from_secs(5)).await;
    // Registry flips to established right after the shell opens
    sleep(Duration::from_millis(200)).await;

    let body: serde_json::Value = reqwest::get(relay.http_url("/api/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["activeConnections"], 1);
    let conn = &body["connections"][0];
    assert_eq!(conn["host"], "127.0.0.1");
    assert_eq!(conn["username"], TEST_USER);
    assert_eq!(conn["established"], true);
    assert!(conn["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(conn["connectedAt"].as_str().is_some());
    assert!(conn["connectionDuration"].is_u64());
    // Secrets never leak through the stats API
    assert!(!body.to_string().contains("secret"));
}

// ---------------------------------------------------------------------------
// Status page and probes
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_status_page() {
    let dir = tempfile::TempDir::new().unwrap();
    let relay = start_relay(relay_config(22, dir.path().join("absent_key"))).await;

    let resp = reqwest::get(relay.http_url("/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Active connections: 0"), "{body}");
}

#[tokio::test]
async fn test_status_page_disabled() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = relay_config(22, dir.path().join("absent_key"));
    config.server.status_page = false;
    let relay = start_relay(config).await;

    let resp = reqwest::get(relay.http_url("/")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_livez() {
    let dir = tempfile::TempDir::new().unwrap();
    let relay = start_relay(relay_config(22, dir.path().join("absent_key"))).await;

    let resp = reqwest::get(relay.http_url("/livez")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_upgrade_on_root_is_relayed() {
    let dir = tempfile::TempDir::new().unwrap();
    let relay = start_relay(relay_config(22, dir.path().join("absent_key"))).await;

    let url = format!("ws://127.0.0.1:{}/?username=x", relay.port);
    let mut ws = ws_connect(&url).await;
    let (frames, closed) = read_to_close(&mut ws, Duration::from_secs(5)).await;
    assert!(closed);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("missing host parameter"));
}

#[tokio::test]
async fn test_upgrade_on_root_survives_disabled_status_page() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = relay_config(22, dir.path().join("absent_key"));
    config.server.status_page = false;
    let relay = start_relay(config).await;

    let url = format!("ws://127.0.0.1:{}/?username=x", relay.port);
    let mut ws = ws_connect(&url).await;
    let (frames, closed) = read_to_close(&mut ws, Duration::from_secs(5)).await;
    assert!(closed);
    assert_eq!(
        frames,
        vec!["\x1b[31mError: missing host parameter\x1b[0m\r\n".to_string()]
    );

    let resp = reqwest::get(relay.http_url("/")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

// ---------------------------------------------------------------------------
// Metrics server
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_metrics_server_reports_rejections() {
    let metrics_port = free_port().await;
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = relay_config(22, dir.path().join("absent_key"));
    config.metrics.enabled = true;
    config.metrics.listen = format!("127.0.0.1:{metrics_port}");
    let relay = start_relay(config).await;
    sleep(Duration::from_millis(100)).await;

    let mut ws = ws_connect(&relay.ws_url("username=x")).await;
    read_to_close(&mut ws, Duration::from_secs(5)).await;

    let health = reqwest::get(format!("http://127.0.0.1:{metrics_port}/health"))
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    let text = reqwest::get(format!("http://127.0.0.1:{metrics_port}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(
        text.contains("relay_requests_rejected_total{reason=\"missing_parameter\"} 1"),
        "{text}"
    );
    assert!(text.contains("relay_sessions_active 0"));
}
