//! Port traits: the hexagonal boundary between bridge logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BridgeService (domain)
//! ```
//!
//! Driven adapters (SPP radio, clock, NVS, telemetry) implement these
//! traits.  The [`BridgeService`](super::service::BridgeService) and the
//! components under it consume them via generics, so the domain core
//! never touches the Bluetooth stack directly.

use crate::error::LinkError;
use crate::link::BdAddr;

// ───────────────────────────────────────────────────────────────
// Serial link port (driven adapter: domain ↔ SPP radio)
// ───────────────────────────────────────────────────────────────

/// Raw Bluetooth Classic serial link.
///
/// Implementations wrap a single SPP client channel.  Retry policy,
/// framing, and timing live above this trait in
/// [`LinkDriver`](crate::link::LinkDriver).
pub trait SerialLink {
    /// One connect attempt by hardware address.
    fn connect_address(&mut self, addr: &BdAddr) -> Result<(), LinkError>;

    /// Discover a device advertising `name`, then connect to it.
    fn connect_name(&mut self, name: &str) -> Result<(), LinkError>;

    /// Live link status as reported by the radio.
    fn is_connected(&self) -> bool;

    /// Whether a client handle is held (possibly stale after a drop).
    fn has_client(&self) -> bool;

    /// Tear down the channel.  Safe to call when already down.
    fn disconnect(&mut self);

    /// Queue bytes for transmission.  Returns how many were accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Pop one received byte, if any is buffered.
    fn read_byte(&mut self) -> Option<u8>;

    /// Address of the current or most recent peer, once known.
    fn peer_address(&self) -> Option<BdAddr>;

    /// Drop the stored link key for `addr` so the next connect re-pairs.
    fn remove_bond(&mut self, addr: &BdAddr) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Time port (driven adapter: domain → system timer)
// ───────────────────────────────────────────────────────────────

/// Monotonic clock plus the blocking delay used between toggles and
/// connect retries.
pub trait TimePort {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the scheduler thread for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Persistence port (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Boolean key-value persistence.  Only the "ever paired" flag lives here.
pub trait PersistencePort {
    /// Read `key`, falling back to `default` when absent or unreadable.
    fn get_bool(&self, key: &str, default: bool) -> bool;

    /// Write `key` atomically.
    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Thermal port (driven adapter: domain ← on-die sensor)
// ───────────────────────────────────────────────────────────────

pub trait ThermalPort {
    /// Chip temperature in °C, `None` when the sensor has no reading.
    fn read_celsius(&mut self) -> Option<f32>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → telemetry / logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`PersistencePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
