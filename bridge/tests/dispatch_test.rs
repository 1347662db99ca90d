// Intent handling: mode gate, translation and the device round trip.

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{any, body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use incubator_bridge::{AppState, CommandFailure, DeviceClient};
use incubator_common::{
    CommandStatus, ConnectivityState, DeviceConfig, Intent, IntentError, OperatingMode,
    ServerEvent,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AppState) {
    let server = MockServer::start().await;
    let device = DeviceClient::new(&DeviceConfig {
        base_url: server.uri(),
        poll_interval_ms: 1_000,
        request_timeout_ms: 200,
    })
    .unwrap();
    let (state, _poller) = AppState::new(device);
    (server, state)
}

async fn accept_command(server: &MockServer, command: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/cmd"))
        .and(body_string(command))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ── Mode gate ───────────────────────────────────────────────────────

#[tokio::test]
async fn auto_mode_denies_setpoint_without_calling_device() {
    let (server, state) = setup().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let mut events = state.subscribe();

    let outcome = state.dispatch(Intent::new("temperature", 37.6)).await;

    assert!(outcome.command.is_none());
    match &outcome.result {
        Err(CommandFailure::Rejected(IntentError::DeniedByMode { intent_type, mode })) => {
            assert_eq!(intent_type, "temperature");
            assert_eq!(*mode, OperatingMode::Auto);
        }
        other => panic!("expected DeniedByMode, got {other:?}"),
    }
    assert_eq!(
        outcome.to_status(),
        CommandStatus {
            success: false,
            command: String::new(),
            error: Some("Command 'temperature' is not allowed in AUTO mode".to_string()),
            resp: None,
        }
    );
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn manual_mode_sends_humidity_setpoint() {
    let (server, state) = setup().await;
    accept_command(&server, "MODE:MANUAL", 1).await;
    accept_command(&server, "SET_HUM:56", 1).await;

    assert!(state.dispatch(Intent::new("mode", "MANUAL")).await.is_success());
    let outcome = state.dispatch(Intent::new("humidity", 56)).await;

    assert_eq!(
        outcome.to_status(),
        CommandStatus {
            success: true,
            command: "SET_HUM:56".to_string(),
            error: None,
            resp: Some(json!({ "ok": true })),
        }
    );
}

#[tokio::test]
async fn mode_intent_is_always_authorized_and_announced() {
    let (server, state) = setup().await;
    accept_command(&server, "MODE:MANUAL", 1).await;
    let mut events = state.subscribe();

    let outcome = state.dispatch(Intent::new("mode", "manual")).await;

    assert!(outcome.is_success());
    assert_eq!(state.mode().await, OperatingMode::Manual);
    assert_eq!(
        events.try_recv().unwrap(),
        ServerEvent::ModeStatus {
            mode: OperatingMode::Manual
        }
    );
}

#[tokio::test]
async fn emergency_stop_passes_in_auto() {
    let (server, state) = setup().await;
    accept_command(&server, "EMERGENCY_STOP", 1).await;

    let outcome = state.dispatch(Intent::new("emergency_stop", true)).await;

    assert!(outcome.is_success());
    assert_eq!(state.mode().await, OperatingMode::Auto);
}

#[tokio::test]
async fn mode_change_sticks_when_device_rejects_it() {
    let (server, state) = setup().await;
    Mock::given(method("POST"))
        .and(path("/cmd"))
        .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
        .mount(&server)
        .await;

    let outcome = state.dispatch(Intent::new("mode", "MANUAL")).await;

    assert!(!outcome.is_success());
    assert_eq!(state.mode().await, OperatingMode::Manual);
}

#[tokio::test]
async fn concurrent_mode_changes_reach_device_in_gate_order() {
    let (server, state) = setup().await;
    Mock::given(method("POST"))
        .and(path("/cmd"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let started = Instant::now();
    let (first, second) = tokio::join!(
        state.dispatch(Intent::new("mode", "MANUAL")),
        state.dispatch(Intent::new("mode", "AUTO")),
    );

    assert!(first.is_success() && second.is_success());
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "mode sends overlapped"
    );
    let bodies: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect();
    assert_eq!(bodies, vec!["MODE:MANUAL", "MODE:AUTO"]);
    assert_eq!(state.mode().await, OperatingMode::Auto);
}

// ── Translation and device failures ─────────────────────────────────

#[tokio::test]
async fn unknown_intent_in_manual_never_reaches_device() {
    let (server, state) = setup().await;
    accept_command(&server, "MODE:MANUAL", 1).await;
    state.dispatch(Intent::new("mode", "MANUAL")).await;

    let outcome = state.dispatch(Intent::new("open_pod_bay", true)).await;

    assert_eq!(
        outcome.to_status().error.as_deref(),
        Some("Unknown command type: open_pod_bay")
    );
    // Only the mode command was received.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn device_failure_is_reported_without_touching_connectivity() {
    let (server, state) = setup().await;
    Mock::given(method("POST"))
        .and(path("/cmd"))
        .respond_with(ResponseTemplate::new(500).set_body_string("relay stuck"))
        .mount(&server)
        .await;
    let mut events = state.subscribe();

    let outcome = state.dispatch(Intent::new("reset", true)).await;

    assert_eq!(
        outcome.to_status(),
        CommandStatus {
            success: false,
            command: "RESET".to_string(),
            error: Some("device /cmd failed: 500 relay stuck".to_string()),
            resp: None,
        }
    );
    assert_eq!(state.link_status().state, ConnectivityState::Unknown);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}
