//! Outbound application events.
//!
//! The [`BridgeService`](super::service::BridgeService) and the poller emit
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! on the other side decide what to do with them: log to serial, publish
//! over MQTT, or both.

use crate::protocol::status::StatusRecord;

/// Structured events emitted by the bridge core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started.
    Started,

    /// The soundbar's status differs from the last published one.
    /// Always carries the full record, never a delta.
    StatusChanged(StatusRecord),

    /// The link status string changed.  Never repeated back to back.
    LinkStatus(&'static str),

    /// The soundbar became reachable (`true`) or unreachable (`false`).
    Availability(bool),

    /// Bridge chip temperature in °C, sent when it moves past the
    /// publish threshold.
    ChipTemperature(f32),
}
