use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::types::{ConnectivityState, LinkStatus, TelemetrySnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    pub at: DateTime<Utc>,
}

/// Reachability of the device as seen by the poller. Only poll outcomes move it.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityTracker {
    state: ConnectivityState,
    since: Option<DateTime<Utc>>,
    telemetry: Option<Arc<TelemetrySnapshot>>,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn telemetry(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.telemetry.clone()
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            since: self.since,
            telemetry: self.telemetry.clone(),
        }
    }

    pub fn record_success(
        &mut self,
        snapshot: TelemetrySnapshot,
        now: DateTime<Utc>,
    ) -> Option<ConnectivityChange> {
        self.telemetry = Some(Arc::new(snapshot));
        self.transition(ConnectivityState::Connected, now)
    }

    /// The previous snapshot is kept so clients can judge staleness from its age.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> Option<ConnectivityChange> {
        self.transition(ConnectivityState::Disconnected, now)
    }

    fn transition(
        &mut self,
        to: ConnectivityState,
        now: DateTime<Utc>,
    ) -> Option<ConnectivityChange> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        self.since = Some(now);
        Some(ConnectivityChange { from, to, at: now })
    }
}
