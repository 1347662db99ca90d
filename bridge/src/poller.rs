use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use incubator_common::{ConnectivityTracker, LinkStatus, ServerEvent, TelemetryPayload};

use crate::device::DeviceClient;

/// Sole writer of the device link state. Runs from process start whether or
/// not any client is attached.
pub struct Poller {
    device: DeviceClient,
    tracker: ConnectivityTracker,
    status_tx: watch::Sender<LinkStatus>,
    events: broadcast::Sender<ServerEvent>,
}

impl Poller {
    pub fn new(
        device: DeviceClient,
        status_tx: watch::Sender<LinkStatus>,
        events: broadcast::Sender<ServerEvent>,
    ) -> Self {
        Self {
            device,
            tracker: ConnectivityTracker::new(),
            status_tx,
            events,
        }
    }

    pub async fn poll_once(&mut self) {
        match self.device.fetch_telemetry().await {
            Ok(raw) => {
                let now = Utc::now();
                let snapshot = raw.into_snapshot(now);
                let payload = TelemetryPayload::from(&snapshot);
                let change = self.tracker.record_success(snapshot, now);
                self.status_tx.send_replace(self.tracker.status());

                if change.is_some() {
                    info!("device connected at {}", self.device.base_url());
                    self.emit(ServerEvent::ArduinoStatus { connected: true });
                }
                self.emit(ServerEvent::Telemetry(payload));
            }
            Err(err) => match self.tracker.record_failure(Utc::now()) {
                Some(_) => {
                    self.status_tx.send_replace(self.tracker.status());
                    warn!("device disconnected: {err}");
                    self.emit(ServerEvent::ArduinoStatus { connected: false });
                }
                None => debug!("telemetry poll failed: {err}"),
            },
        }
    }

    /// Polls every `period`. A poll that outlasts the period swallows the ticks
    /// it overlapped, so two polls are never in flight together.
    pub fn spawn(mut self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.poll_once() => {}
                }
            }
            info!("telemetry poller stopped");
        })
    }

    fn emit(&self, event: ServerEvent) {
        // No subscribers just means no dashboard is open.
        let _ = self.events.send(event);
    }
}
