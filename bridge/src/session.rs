use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use incubator_common::{ClientMessage, CommandStatus, OperatingMode, ServerEvent};

use crate::control::AppState;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// What one client has already been told. The replay and the fan-out can
/// overlap around a poll, so repeats of a status or an old snapshot are dropped.
#[derive(Debug, Default)]
struct ClientView {
    connected: Option<bool>,
    mode: Option<OperatingMode>,
    telemetry_at: Option<DateTime<Utc>>,
}

impl ClientView {
    fn admit(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::ArduinoStatus { connected } => {
                self.connected.replace(*connected) != Some(*connected)
            }
            ServerEvent::ModeStatus { mode } => self.mode.replace(*mode) != Some(*mode),
            ServerEvent::Telemetry(payload) => {
                if self.telemetry_at.is_some_and(|at| payload.timestamp <= at) {
                    return false;
                }
                self.telemetry_at = Some(payload.timestamp);
                true
            }
            ServerEvent::CommandStatus(_) => true,
        }
    }
}

pub async fn handle_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    info!("client {client_id} connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Subscribe before taking the replay so nothing published in between is lost.
    let mut shared = state.subscribe();
    for event in state.replay().await {
        let _ = tx.send(event);
    }

    let fanout_state = state.clone();
    let writer = tokio::spawn(async move {
        let mut view = ClientView::default();
        'session: loop {
            let events = tokio::select! {
                biased;
                direct = rx.recv() => match direct {
                    Some(event) => vec![event],
                    None => break,
                },
                fanout = shared.recv() => match fanout_state.catch_up(fanout).await {
                    Some(events) => events,
                    None => break,
                },
            };

            for event in events {
                if !view.admit(&event) {
                    continue;
                }
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("{} serialization failed: {err}", event.name());
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break 'session;
                }
            }
        }
    });

    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::ControlCommand(intent)) => {
                let state = state.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = state.dispatch(intent).await;
                    let _ = tx.send(ServerEvent::CommandStatus(outcome.to_status()));
                });
            }
            Err(err) => {
                debug!("client {client_id} sent an unreadable frame: {err}");
                let _ = tx.send(ServerEvent::CommandStatus(CommandStatus {
                    success: false,
                    command: String::new(),
                    error: Some(format!("Invalid message: {err}")),
                    resp: None,
                }));
            }
        }
    }

    writer.abort();
    info!("client {client_id} disconnected");
}
