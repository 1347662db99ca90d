use std::{io::ErrorKind, path::Path, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};

use incubator_common::{config::ENV_CONFIG_PATH, BridgeConfig, OperatingMode};

use crate::{
    control::AppState,
    device::{DeviceClient, DeviceError},
    session,
};

#[derive(Debug, Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug, Serialize)]
struct TelemetryView {
    ok: bool,
    temperature: Option<f64>,
    humidity: Option<f64>,
    age_ms: Option<u64>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct BridgeStatusView {
    connected: bool,
    state: &'static str,
    since: Option<DateTime<Utc>>,
    mode: OperatingMode,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config().await;
    let device = DeviceClient::new(&config.device).context("failed to set up device client")?;
    let (app_state, poller) = AppState::new(device);

    let cancel = CancellationToken::new();
    let poll_task = poller.spawn(
        Duration::from_millis(config.device.poll_interval_ms),
        cancel.clone(),
    );

    let app = router(app_state, config.http.web_root.as_deref());

    let listener = TcpListener::bind((config.http.bind.as_str(), config.http.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind bridge server at {}:{}",
                config.http.bind, config.http.port
            )
        })?;
    let addr = listener.local_addr()?;

    info!("bridge listening on http://{addr}");
    info!(
        "device at {} (poll every {} ms, timeout {} ms)",
        config.device.base_url, config.device.poll_interval_ms, config.device.request_timeout_ms
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(err) = poll_task.await {
        warn!("telemetry poller ended abnormally: {err}");
    }
    Ok(())
}

pub fn router(app_state: AppState, web_root: Option<&str>) -> Router {
    let router = Router::new()
        .route("/ws", get(session::handle_ws))
        .route("/api/ping-esp", get(handle_ping_device))
        .route("/api/telemetry", get(handle_get_telemetry))
        .route("/api/status", get(handle_get_status));

    let router = match web_root {
        Some(root) => router.fallback_service(ServeDir::new(root)),
        None => router,
    };

    router.layer(CorsLayer::permissive()).with_state(app_state)
}

async fn load_config() -> BridgeConfig {
    let mut config = match std::env::var(ENV_CONFIG_PATH) {
        Ok(path) => read_config_file(Path::new(&path))
            .await
            .unwrap_or_else(|err| {
                warn!("failed to load config from {path}: {err:#}");
                BridgeConfig::default()
            }),
        Err(_) => BridgeConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config.sanitize();
    config
}

async fn read_config_file(path: &Path) -> anyhow::Result<BridgeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice::<BridgeConfig>(&raw)
            .with_context(|| format!("invalid config file {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn handle_ping_device(State(state): State<AppState>) -> Response {
    match state.device.fetch_status().await {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
            (status, body_or_ok(reply.body)).into_response()
        }
        Err(DeviceError::Status { status, body, .. }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body_or_ok(body)).into_response()
        }
        Err(err) => {
            warn!("device ping failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

async fn handle_get_telemetry(State(state): State<AppState>) -> impl IntoResponse {
    let view = match state.link_status().telemetry {
        Some(snapshot) => TelemetryView {
            ok: true,
            temperature: snapshot.temperature,
            humidity: snapshot.humidity,
            age_ms: snapshot.age_ms,
            timestamp: Some(snapshot.observed_at),
        },
        None => TelemetryView {
            ok: true,
            temperature: None,
            humidity: None,
            age_ms: None,
            timestamp: None,
        },
    };
    Json(view)
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.link_status();
    Json(BridgeStatusView {
        connected: status.state.is_connected(),
        state: status.state.as_str(),
        since: status.since,
        mode: state.mode().await,
    })
}

fn body_or_ok(body: String) -> String {
    if body.is_empty() {
        "OK".to_string()
    } else {
        body
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            ok: false,
            error: message.to_string(),
        }),
    )
        .into_response()
}
