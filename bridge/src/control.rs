use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch, Mutex,
};
use tracing::{debug, info, warn};

use incubator_common::{
    commands::INTENT_MODE, translate, CommandStatus, Intent, IntentError, LinkStatus, ModeGate,
    OperatingMode, ServerEvent, TelemetryPayload, WireCommand,
};

use crate::{
    device::{DeviceClient, DeviceError},
    poller::Poller,
};

const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum CommandFailure {
    #[error(transparent)]
    Rejected(#[from] IntentError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Debug)]
pub struct CommandOutcome {
    pub command: Option<WireCommand>,
    pub result: Result<Value, CommandFailure>,
}

impl CommandOutcome {
    fn rejected(err: IntentError) -> Self {
        Self {
            command: None,
            result: Err(err.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn to_status(&self) -> CommandStatus {
        let command = self
            .command
            .as_ref()
            .map(|command| command.to_string())
            .unwrap_or_default();

        match &self.result {
            Ok(resp) => CommandStatus {
                success: true,
                command,
                error: None,
                resp: Some(resp.clone()),
            },
            Err(err) => CommandStatus {
                success: false,
                command,
                error: Some(err.to_string()),
                resp: None,
            },
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub device: DeviceClient,
    gate: Arc<Mutex<ModeGate>>,
    // Held from the gate update until the device has the `MODE:` command, so
    // the device sees mode changes in the order the gate applied them.
    mode_sends: Arc<Mutex<()>>,
    status: watch::Receiver<LinkStatus>,
    events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    /// Builds the shared state together with the poller that feeds it.
    pub fn new(device: DeviceClient) -> (Self, Poller) {
        let (status_tx, status) = watch::channel(LinkStatus::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let poller = Poller::new(device.clone(), status_tx, events.clone());

        let state = Self {
            device,
            gate: Arc::new(Mutex::new(ModeGate::default())),
            mode_sends: Arc::new(Mutex::new(())),
            status,
            events,
        };
        (state, poller)
    }

    pub fn link_status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub async fn mode(&self) -> OperatingMode {
        self.gate.lock().await.mode()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Events a newly attached client needs to catch up, in send order.
    pub async fn replay(&self) -> Vec<ServerEvent> {
        let status = self.link_status();
        let mut events = vec![
            ServerEvent::ArduinoStatus {
                connected: status.state.is_connected(),
            },
            ServerEvent::ModeStatus {
                mode: self.mode().await,
            },
        ];
        if let Some(snapshot) = status.telemetry {
            events.push(ServerEvent::Telemetry(TelemetryPayload::from(
                snapshot.as_ref(),
            )));
        }
        events
    }

    /// Turns one fan-out receive into what the client should be sent. A
    /// receiver that fell behind gets the current state in place of the events
    /// it missed; `None` means the channel is gone.
    pub async fn catch_up(
        &self,
        received: Result<ServerEvent, RecvError>,
    ) -> Option<Vec<ServerEvent>> {
        match received {
            Ok(event) => Some(vec![event]),
            Err(RecvError::Lagged(skipped)) => {
                debug!("fan-out receiver skipped {skipped} events, resending current state");
                Some(self.replay().await)
            }
            Err(RecvError::Closed) => None,
        }
    }

    /// Gate, translate, send. Never touches connectivity; the outcome belongs
    /// to the requesting client alone.
    pub async fn dispatch(&self, intent: Intent) -> CommandOutcome {
        let _mode_send = if intent.intent_type == INTENT_MODE {
            Some(self.mode_sends.lock().await)
        } else {
            None
        };

        let admitted = {
            let mut gate = self.gate.lock().await;
            gate.admit(&intent).map(|changed| changed.then(|| gate.mode()))
        };

        match admitted {
            Ok(Some(mode)) => {
                info!("operating mode set to {mode}");
                let _ = self.events.send(ServerEvent::ModeStatus { mode });
            }
            Ok(None) => {}
            Err(err) => {
                warn!("command rejected: {err}");
                return CommandOutcome::rejected(err);
            }
        }

        let command = match translate(&intent) {
            Ok(command) => command,
            Err(err) => {
                warn!("command rejected: {err}");
                return CommandOutcome::rejected(err);
            }
        };

        let result = self.device.send_command(&command).await;
        match &result {
            Ok(_) => info!("device accepted {command}"),
            Err(err) => warn!("device command {command} failed: {err}"),
        }

        CommandOutcome {
            command: Some(command),
            result: result.map_err(CommandFailure::from),
        }
    }
}
