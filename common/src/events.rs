use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Intent, OperatingMode, TelemetrySnapshot};

pub const EVENT_CONTROL_COMMAND: &str = "control-command";
pub const EVENT_ARDUINO_STATUS: &str = "arduino-status";
pub const EVENT_TELEMETRY: &str = "telemetry";
pub const EVENT_COMMAND_STATUS: &str = "command-status";
pub const EVENT_MODE_STATUS: &str = "mode-status";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub age_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&TelemetrySnapshot> for TelemetryPayload {
    fn from(snapshot: &TelemetrySnapshot) -> Self {
        Self {
            temperature: snapshot.temperature,
            humidity: snapshot.humidity,
            age_ms: snapshot.age_ms,
            timestamp: snapshot.observed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<Value>,
}

/// Frames pushed to dashboard clients: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "arduino-status")]
    ArduinoStatus { connected: bool },
    #[serde(rename = "telemetry")]
    Telemetry(TelemetryPayload),
    #[serde(rename = "command-status")]
    CommandStatus(CommandStatus),
    #[serde(rename = "mode-status")]
    ModeStatus { mode: OperatingMode },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArduinoStatus { .. } => EVENT_ARDUINO_STATUS,
            Self::Telemetry(_) => EVENT_TELEMETRY,
            Self::CommandStatus(_) => EVENT_COMMAND_STATUS,
            Self::ModeStatus { .. } => EVENT_MODE_STATUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "control-command")]
    ControlCommand(Intent),
}
