pub mod commands;
pub mod config;
pub mod connectivity;
pub mod events;
pub mod gate;
pub mod types;

pub use commands::{translate, IntentError, COMMAND_TABLE};
pub use config::{BridgeConfig, DeviceConfig, HttpConfig};
pub use connectivity::{ConnectivityChange, ConnectivityTracker};
pub use events::{ClientMessage, CommandStatus, ServerEvent, TelemetryPayload};
pub use gate::ModeGate;
pub use types::{
    ConnectivityState, Intent, LinkStatus, OperatingMode, RawTelemetry, TelemetrySnapshot,
    WireCommand,
};
