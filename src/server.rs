//! # HTTP Surface
//!
//! The `axum` router exposing the alert service:
//!
//! - `GET /` reports the system name, mode and current time.
//! - `GET /heartbeat` adds uptime and the configured recipients.
//! - `GET /sync` performs a handshake with the configured upstream proxy.
//! - `POST /notify` dispatches an alert to the notification channels.
//! - `POST /vision/scan` appends a scan request to the scan log.
//! - `GET /vision/status` is the bench self-diagnostic.
//! - `GET /metrics` renders Prometheus metrics, when enabled.

use crate::config::{ProxyConfig, VisionConfig};
use crate::core::AlertRequest;
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::recipients::RecipientSet;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

const SCAN_STATUS: &str = "Vision® Active";

/// Everything the request handlers read. Immutable after startup.
pub struct ServerState {
    pub dispatcher: Arc<Dispatcher>,
    pub system_name: String,
    pub mode: String,
    pub recipients: RecipientSet,
    pub proxy: ProxyConfig,
    pub http: reqwest::Client,
    pub started_at: Instant,
    pub metrics_handle: Option<PrometheusHandle>,
    pub vision: VisionConfig,
    /// Serializes appends to the scan log.
    pub scan_log_lock: Mutex<()>,
}

/// Body of `POST /notify`.
#[derive(Debug, Default, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Body of `POST /vision/scan`.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub system: Option<String>,
}

/// One line of the scan log.
#[derive(Debug, Serialize)]
struct ScanEntry<'a> {
    time: String,
    system: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client: Option<&'a str>,
}

/// Builds the application router.
pub fn router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new()
        .route("/", get(status))
        .route("/heartbeat", get(heartbeat))
        .route("/sync", get(sync))
        .route("/notify", post(notify))
        .route("/vision/scan", post(scan))
        .route("/vision/status", get(vision_status));

    if let Some(handle) = state.metrics_handle.clone() {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router.with_state(state)
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "system": state.system_name,
        "status": "online",
        "mode": state.mode,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn heartbeat(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "mode": state.mode,
        "timestamp": Utc::now().to_rfc3339(),
        "recipients": state.recipients,
    }))
}

#[instrument(skip_all)]
async fn sync(State(state): State<Arc<ServerState>>) -> (StatusCode, Json<Value>) {
    let Some(url) = state.proxy.url.as_deref() else {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "success": false,
                "proxy": Value::Null,
                "error": "proxy URL not configured",
            })),
        );
    };

    let mut request = state.http.get(url);
    if let Some(key) = state.proxy.security_key.as_deref() {
        request = request.header(state.proxy.security_header.as_str(), key);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            info!(proxy = %url, status = %response.status(), "Proxy handshake succeeded");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "proxy": url,
                    "proxy_status": response.status().as_u16(),
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
        }
        Ok(response) => {
            let status = response.status();
            warn!(proxy = %url, status = %status, "Proxy handshake rejected");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "success": false,
                    "proxy": url,
                    "proxy_status": status.as_u16(),
                    "error": format!("upstream returned status {}", status),
                })),
            )
        }
        Err(e) => {
            warn!(proxy = %url, error = %e, "Proxy unreachable");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "success": false,
                    "proxy": url,
                    "error": e.to_string(),
                })),
            )
        }
    }
}

#[instrument(skip_all)]
async fn notify(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": rejection.body_text() })),
            );
        }
    };

    let request = AlertRequest::new(
        payload.subject.unwrap_or_default(),
        payload.text.unwrap_or_default(),
    );

    match state.dispatcher.dispatch(&request).await {
        Err(DispatchError::Validation(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": format!("Missing subject or text: {}", reason),
            })),
        ),
        Ok(result) if result.overall_success => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Alert sent",
                "outcomes": result.outcomes,
            })),
        ),
        Ok(result) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": "Alert delivery failed",
                "failed_channels": result.failed_channels(),
                "outcomes": result.outcomes,
            })),
        ),
    }
}

#[instrument(skip_all)]
async fn scan(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    // A missing or unparsable body is logged as an unknown system.
    let system = payload
        .ok()
        .and_then(|Json(request)| request.system)
        .filter(|s| !s.is_empty());
    let entry = ScanEntry {
        time: Utc::now().to_rfc3339(),
        system: system.as_deref().unwrap_or("unknown"),
        status: SCAN_STATUS,
        client: headers.get(USER_AGENT).and_then(|v| v.to_str().ok()),
    };

    if let Err(e) = append_scan(&state, &entry).await {
        error!(path = %state.vision.scan_log.display(), error = %e, "Failed to record scan");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": e.to_string() })),
        );
    }
    debug!(system = entry.system, "Scan recorded");

    (
        StatusCode::OK,
        Json(json!({
            "status": SCAN_STATUS,
            "message": "System running normally",
            "timestamp": entry.time,
        })),
    )
}

async fn append_scan(state: &ServerState, entry: &ScanEntry<'_>) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');

    let _guard = state.scan_log_lock.lock().await;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&state.vision.scan_log)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

async fn vision_status(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "system": state.vision.status_system,
        "status": "✅ Online",
        "lastCheck": Utc::now().to_rfc3339(),
    }))
}
