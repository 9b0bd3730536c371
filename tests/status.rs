//! Tests for the status, heartbeat and sync endpoints.

mod helpers;

use anyhow::Result;
use helpers::app::TestAppBuilder;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_root_reports_system_status() -> Result<()> {
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| config.mode = "staging".to_string())
        .build()
        .await?;

    let body: Value = app.client.get(app.url("/")).send().await?.json().await?;

    assert_eq!(body["system"], "Vision System");
    assert_eq!(body["status"], "online");
    assert_eq!(body["mode"], "staging");
    assert!(body["timestamp"].is_string());

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_heartbeat_lists_recipients() -> Result<()> {
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| {
            config.admin_emails = Some("ops@example.com, oncall@example.com".to_string())
        })
        .build()
        .await?;

    let response = app.client.get(app.url("/heartbeat")).send().await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;

    assert_eq!(body["status"], "alive");
    assert!(body["uptime_seconds"].is_u64());
    assert_eq!(body["mode"], "production");
    assert_eq!(
        body["recipients"],
        json!(["ops@example.com", "oncall@example.com"])
    );

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_sync_sends_security_key_to_proxy() -> Result<()> {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/handshake"))
        .and(header("x-security-key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&proxy)
        .await;

    let proxy_url = format!("{}/handshake", proxy.uri());
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| {
            config.proxy.url = Some(proxy_url.clone());
            config.proxy.security_key = Some("s3cret".to_string());
        })
        .build()
        .await?;

    let response = app.client.get(app.url("/sync")).send().await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["proxy"], proxy_url.as_str());
    assert_eq!(body["proxy_status"], 200);

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_sync_with_unreachable_proxy_is_bad_gateway() -> Result<()> {
    let proxy_url = "http://127.0.0.1:1/handshake";
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| config.proxy.url = Some(proxy_url.to_string()))
        .build()
        .await?;

    let response = app.client.get(app.url("/sync")).send().await?;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["proxy"], proxy_url);
    assert!(!body["error"].as_str().unwrap().is_empty());

    // The server keeps serving after the failed handshake.
    let response = app.client.get(app.url("/")).send().await?;
    assert_eq!(response.status(), 200);

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_sync_without_proxy_is_bad_gateway() -> Result<()> {
    let app = TestAppBuilder::new().build().await?;

    let response = app.client.get(app.url("/sync")).send().await?;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "proxy URL not configured");

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_metrics_route_is_absent_when_disabled() -> Result<()> {
    let app = TestAppBuilder::new().build().await?;

    let response = app.client.get(app.url("/metrics")).send().await?;
    assert_eq!(response.status(), 404);

    tokio_test::assert_ok!(app.shutdown(Duration::from_secs(5)).await);
    Ok(())
}

#[tokio::test]
async fn test_vision_scan_appends_log_line() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("vision_log.txt");
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| config.vision.scan_log = log_path.clone())
        .build()
        .await?;

    let response = app
        .client
        .post(app.url("/vision/scan"))
        .header("user-agent", "VinoAuto/2.1")
        .json(&json!({ "system": "Bay 3 Scanner" }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "Vision® Active");
    assert_eq!(body["message"], "System running normally");
    let timestamp = body["timestamp"].as_str().unwrap().to_string();

    // No body at all: recorded as an unknown system.
    let response = app.client.post(app.url("/vision/scan")).send().await?;
    assert_eq!(response.status(), 200);

    let contents = std::fs::read_to_string(&log_path)?;
    let lines: Vec<Value> = contents
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["time"], timestamp.as_str());
    assert_eq!(lines[0]["system"], "Bay 3 Scanner");
    assert_eq!(lines[0]["status"], "Vision® Active");
    assert_eq!(lines[0]["client"], "VinoAuto/2.1");
    assert_eq!(lines[1]["system"], "unknown");

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_vision_scan_reports_unwritable_log() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("missing").join("vision_log.txt");
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| config.vision.scan_log = log_path.clone())
        .build()
        .await?;

    let response = app
        .client
        .post(app.url("/vision/scan"))
        .json(&json!({ "system": "Bay 3 Scanner" }))
        .send()
        .await?;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);
    assert!(!log_path.exists());

    app.shutdown(Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_vision_status_reports_bench() -> Result<()> {
    let app = TestAppBuilder::new().build().await?;

    let response = app.client.get(app.url("/vision/status")).send().await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["system"], "Vino Auto BenchLab");
    assert_eq!(body["status"], "✅ Online");
    assert!(body["lastCheck"].is_string());

    app.shutdown(Duration::from_secs(5)).await
}
