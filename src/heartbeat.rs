//! Heartbeat scheduling and zombie-connection detection.

use crate::Latency;
use std::time::{Duration, Instant};

/// Fraction of the heartbeat interval after which a heartbeat send is
/// considered slow enough to warrant a diagnostic warning.
const SLOW_SEND_THRESHOLD: f64 = 0.15;

/// Tracks heartbeat timing for a single transport connection and detects a
/// zombied connection: a peer that stopped acknowledging heartbeats.
#[derive(Debug)]
pub(crate) struct Heartbeater {
    /// Interval at which heartbeats are sent, supplied by HELLO.
    interval: Duration,
    /// When the previous heartbeat was sent; `None` means "never".
    last_heartbeat_sent: Option<Instant>,
    /// When the previous acknowledgement was received; `None` means "never".
    last_ack_received: Option<Instant>,
    /// Measured round-trip latency, exposed to the caller.
    latency: Latency,
}

impl Heartbeater {
    /// Create a new heartbeater for the given interval.
    pub(crate) const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_heartbeat_sent: None,
            last_ack_received: None,
            latency: Latency::new(),
        }
    }

    /// Interval at which heartbeats are sent.
    pub(crate) const fn interval(&self) -> Duration {
        self.interval
    }

    /// Immutable reference to the tracked latency.
    pub(crate) const fn latency(&self) -> &Latency {
        &self.latency
    }

    /// Check whether the connection is a zombie: no acknowledgement has
    /// arrived for the previous heartbeat since before it was even sent.
    ///
    /// Modeled with `None` standing in for "never" rather than relying on a
    /// NaN sentinel, so the very first call (before any heartbeat has been
    /// sent) can never spuriously report a zombie.
    pub(crate) fn is_zombie(&self) -> bool {
        let Some(last_heartbeat_sent) = self.last_heartbeat_sent else {
            return false;
        };

        let earliest_ack_allowed = last_heartbeat_sent
            .checked_sub(self.interval)
            .unwrap_or(last_heartbeat_sent);

        match self.last_ack_received {
            None => true,
            Some(last_ack_received) => last_ack_received < earliest_ack_allowed,
        }
    }

    /// Record that a heartbeat was sent, returning how long the send itself
    /// took to execute relative to the configured interval.
    pub(crate) fn track_sent(&mut self, send_started_at: Instant) {
        self.last_heartbeat_sent = Some(Instant::now());
        self.latency.track_sent();

        let send_duration = send_started_at.elapsed();
        let threshold = self.interval.mul_f64(SLOW_SEND_THRESHOLD);

        if send_duration > threshold {
            tracing::warn!(
                ?send_duration,
                interval = ?self.interval,
                "heartbeat send took longer than 15% of the interval"
            );
        }
    }

    /// Record that a heartbeat acknowledgement was received.
    pub(crate) fn track_ack(&mut self) {
        self.last_ack_received = Some(Instant::now());
        self.latency.track_received();
    }
}
