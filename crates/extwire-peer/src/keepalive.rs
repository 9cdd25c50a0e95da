use std::time::{Duration, Instant};

use crate::error::{PeerError, Result};

/// Window within which a PONG must follow the last one.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracks host liveness after the helper starts pinging.
///
/// Unarmed until the first outbound PING, so helpers that never ping are
/// never timed out. Every call takes the current instant explicitly.
#[derive(Debug, Clone)]
pub struct KeepaliveSupervisor {
    timeout: Duration,
    last_pong: Option<Instant>,
}

impl KeepaliveSupervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_pong: None,
        }
    }

    /// Start the liveness window at `now` unless it is already running.
    pub fn arm(&mut self, now: Instant) {
        if self.last_pong.is_none() {
            self.last_pong = Some(now);
        }
    }

    /// Restart the liveness window from a received PONG.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.last_pong.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since the last PONG (or arming), if armed.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_pong.map(|t| now.saturating_duration_since(t))
    }

    /// Fail with [`PeerError::LivenessTimeout`] once more than the window has
    /// passed without a PONG.
    pub fn check(&self, now: Instant) -> Result<()> {
        match self.elapsed(now) {
            Some(elapsed) if elapsed > self.timeout => Err(PeerError::LivenessTimeout { elapsed }),
            _ => Ok(()),
        }
    }
}

impl Default for KeepaliveSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_KEEPALIVE_TIMEOUT)
    }
}
