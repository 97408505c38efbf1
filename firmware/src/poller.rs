//! Status poller and diff publisher.
//!
//! The soundbar's own remote changes its state behind the bridge's back,
//! so the poller reads the full status on a fixed interval and publishes
//! whenever any field differs from the last known record.

use log::{debug, info};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, PersistencePort, SerialLink, TimePort};
use crate::connection::ConnectionManager;
use crate::protocol::status::StatusRecord;

/// What one [`StatusPoller::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not connected, or the interval has not elapsed.
    Skipped,
    /// The request failed or the answer did not decode.  Not escalated.
    Failed,
    Unchanged,
    Published,
}

pub struct StatusPoller {
    interval_ms: u32,
    last_poll_ms: Option<u64>,
    last_known: StatusRecord,
}

impl StatusPoller {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_poll_ms: None,
            last_known: StatusRecord::UNKNOWN,
        }
    }

    /// Last successfully decoded status; invalid until the first poll lands.
    pub fn last_known(&self) -> &StatusRecord {
        &self.last_known
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_poll_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= u64::from(self.interval_ms))
    }

    /// Poll if connected and due, then publish on change.
    pub fn tick<L, C, P>(
        &mut self,
        conn: &mut ConnectionManager<L, C, P>,
        sink: &mut impl EventSink,
    ) -> PollOutcome
    where
        L: SerialLink,
        C: TimePort,
        P: PersistencePort,
    {
        let now = conn.now_ms();
        if !conn.is_connected() || !self.is_due(now) {
            return PollOutcome::Skipped;
        }
        self.last_poll_ms = Some(now);

        match conn.request_status() {
            Ok(record) => self.observe(record, sink),
            Err(e) => {
                debug!("STATUS: poll failed: {e}");
                PollOutcome::Failed
            }
        }
    }

    /// Compare `record` against the last known status and publish on any
    /// field difference.  Invalid records change nothing.
    pub fn observe(&mut self, record: StatusRecord, sink: &mut impl EventSink) -> PollOutcome {
        if !record.is_valid() {
            return PollOutcome::Failed;
        }
        if record == self.last_known {
            return PollOutcome::Unchanged;
        }
        info!(
            "STATUS: power={} input={} vol={} sub={} mute={} surround={}",
            record.power,
            record.input.as_str(),
            record.volume,
            record.subwoofer,
            record.muted,
            record.surround.as_str()
        );
        self.last_known = record;
        sink.emit(&AppEvent::StatusChanged(record));
        PollOutcome::Published
    }

    /// Store and publish `record` whether or not it changed.  Used after
    /// explicit commands and on telemetry resync.
    pub fn publish(&mut self, record: StatusRecord, sink: &mut impl EventSink) {
        if !record.is_valid() {
            return;
        }
        self.last_known = record;
        sink.emit(&AppEvent::StatusChanged(record));
    }
}

// ── Chip temperature ──────────────────────────────────────────

/// Publishes the chip temperature when it has moved more than
/// `threshold_c` since the last published value.
pub struct TemperatureMonitor {
    threshold_c: f32,
    last_published: Option<f32>,
    last_reading: Option<f32>,
}

impl TemperatureMonitor {
    pub fn new(threshold_c: f32) -> Self {
        Self {
            threshold_c,
            last_published: None,
            last_reading: None,
        }
    }

    /// Most recent reading, published or not.
    pub fn last_reading(&self) -> Option<f32> {
        self.last_reading
    }

    pub fn last_published(&self) -> Option<f32> {
        self.last_published
    }

    /// Record a reading; returns `true` when it was published.
    pub fn observe(&mut self, celsius: f32, sink: &mut impl EventSink) -> bool {
        if !celsius.is_finite() {
            return false;
        }
        self.last_reading = Some(celsius);
        if self
            .last_published
            .is_some_and(|last| (celsius - last).abs() <= self.threshold_c)
        {
            return false;
        }
        debug!("TEMP: {celsius:.1} °C");
        self.last_published = Some(celsius);
        sink.emit(&AppEvent::ChipTemperature(celsius));
        true
    }
}
