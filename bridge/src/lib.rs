pub mod control;
pub mod device;
pub mod host;
pub mod poller;
pub mod session;

pub use control::{AppState, CommandFailure, CommandOutcome};
pub use device::{DeviceClient, DeviceError, DeviceStatus};
pub use poller::Poller;
