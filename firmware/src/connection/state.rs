//! Connection state: one owned value, written only by the
//! [`ConnectionManager`](super::ConnectionManager).

/// Where the link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    Connected,
    /// Bond dropped on request; automatic reconnect waits out the hold-off.
    PairingReset,
    ConnectFailed,
}

impl LinkPhase {
    /// Status string published to telemetry.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::PairingReset => "pairing_reset",
            Self::ConnectFailed => "connect_failed",
        }
    }
}

/// Link counters.  Monotonic for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub connect_attempts: u32,
    pub successful_connects: u32,
    pub failed_connects: u32,
    pub disconnects: u32,
    pub last_connect_duration_ms: u64,
    /// Closed sessions only; see [`ConnectionState::connected_time_ms`].
    pub total_connected_ms: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub phase: LinkPhase,
    pub connected_since_ms: Option<u64>,
    pub last_attempt_ms: Option<u64>,
    /// Automatic reconnect is suppressed before this instant.
    pub hold_off_until_ms: u64,
    /// Persisted; loaded once at startup.
    pub is_paired: bool,
    pub stats: LinkStats,
    pub last_error: heapless::String<48>,
}

impl ConnectionState {
    pub fn new(is_paired: bool) -> Self {
        Self {
            phase: LinkPhase::Disconnected,
            connected_since_ms: None,
            last_attempt_ms: None,
            hold_off_until_ms: 0,
            is_paired,
            stats: LinkStats::default(),
            last_error: heapless::String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == LinkPhase::Connected
    }

    /// Total connected time including the open session, if any.
    pub fn connected_time_ms(&self, now_ms: u64) -> u64 {
        let open = self
            .connected_since_ms
            .map_or(0, |since| now_ms.saturating_sub(since));
        self.stats.total_connected_ms + open
    }

    /// Successful connects as a percentage of attempts.
    pub fn success_rate(&self) -> Option<f32> {
        let attempts = self.stats.connect_attempts;
        (attempts > 0).then(|| self.stats.successful_connects as f32 * 100.0 / attempts as f32)
    }

    pub(crate) fn set_error(&mut self, args: core::fmt::Arguments<'_>) {
        self.last_error = crate::config::fixed(&std::fmt::format(args));
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error.clear();
    }
}
