//! Bridge configuration parameters
//!
//! Every tunable the link, poller, and convergence logic read.  Defaults
//! match the YAS-209; other soundbar models may need a different
//! subwoofer step or PIN.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::link::BdAddr;

/// Maximum length of a Bluetooth device name we store.
pub const NAME_CAPACITY: usize = 32;

/// Core bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    // --- Identity ---
    /// Name the bridge advertises on Bluetooth.
    pub device_name: heapless::String<NAME_CAPACITY>,
    /// Name used for discovery when the address route fails.
    pub soundbar_name: heapless::String<NAME_CAPACITY>,
    /// Preferred route: connect straight to this address.
    pub soundbar_address: Option<BdAddr>,

    // --- Connection ---
    /// Minimum time between automatic connect attempts.
    pub reconnect_backoff_ms: u32,
    /// Automatic reconnect is suppressed this long after a pairing reset.
    pub pairing_hold_off_ms: u32,
    /// Settle time after tearing down a stale client handle.
    pub stale_client_settle_ms: u32,
    /// Address-route attempts before falling back to the name route.
    pub address_connect_attempts: u8,
    /// Delay between address-route attempts.
    pub address_retry_delay_ms: u32,

    // --- Status polling ---
    /// Overall wait for a status response.
    pub status_timeout_ms: u32,
    /// Silence after the last byte that ends a response.
    pub inter_byte_timeout_ms: u32,
    /// Period of the background status poll.
    pub poll_interval_ms: u32,
    /// Reject status frames whose trailing checksum does not match.
    pub verify_status_checksum: bool,

    // --- Convergence ---
    /// Delay after each toggle; the soundbar drops commands sent faster.
    pub toggle_delay_ms: u32,
    /// Settle time after a command before polling for its effect.
    pub command_settle_ms: u32,
    pub volume_max: u8,
    pub volume_max_steps: u8,
    pub subwoofer_max: u8,
    /// Subwoofer units moved by one toggle.
    pub subwoofer_step: u8,
    pub subwoofer_max_steps: u8,

    // --- Pairing ---
    /// Legacy PIN offered when the soundbar asks for one.
    pub pairing_pin: [u8; 4],

    // --- Telemetry ---
    pub mqtt_base_topic: heapless::String<64>,
    /// Wi-Fi station reconnect interval.
    pub wifi_retry_ms: u32,
    /// Chip temperature change (°C) that triggers a publish.
    pub temperature_delta_c: f32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_name: fixed("YAS-Bridge"),
            soundbar_name: fixed("YAS-209 Yamaha"),
            soundbar_address: None,

            // Connection
            reconnect_backoff_ms: 10_000,
            pairing_hold_off_ms: 30_000,
            stale_client_settle_ms: 500,
            address_connect_attempts: 3,
            address_retry_delay_ms: 2_000,

            // Status polling
            status_timeout_ms: 3_000,
            inter_byte_timeout_ms: 100,
            poll_interval_ms: 2_000,
            verify_status_checksum: false,

            // Convergence
            toggle_delay_ms: 50,
            command_settle_ms: 100,
            volume_max: 50,
            volume_max_steps: 50,
            subwoofer_max: 32,
            subwoofer_step: 4,
            subwoofer_max_steps: 8,

            // Pairing
            pairing_pin: *b"1234",

            // Telemetry
            mqtt_base_topic: fixed("homeassistant/soundbar"),
            wifi_retry_ms: 5_000,
            temperature_delta_c: 0.5,
        }
    }
}

/// Copy `s` into a fixed-capacity string, truncating at a char boundary.
pub fn fixed<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Rejected configuration, naming the offending field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigError(pub &'static str);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl BridgeConfig {
    /// Range-check every field before the config is put to use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.soundbar_name.is_empty() && self.soundbar_address.is_none() {
            return Err(ConfigError("soundbar_name or soundbar_address required"));
        }
        if !(1..=10).contains(&self.address_connect_attempts) {
            return Err(ConfigError("address_connect_attempts must be 1–10"));
        }
        if !(1_000..=600_000).contains(&self.reconnect_backoff_ms) {
            return Err(ConfigError("reconnect_backoff_ms must be 1000–600000"));
        }
        if self.pairing_hold_off_ms > 600_000 {
            return Err(ConfigError("pairing_hold_off_ms must be ≤ 600000"));
        }
        if !(10..=1_000).contains(&self.inter_byte_timeout_ms) {
            return Err(ConfigError("inter_byte_timeout_ms must be 10–1000"));
        }
        if self.status_timeout_ms <= self.inter_byte_timeout_ms {
            return Err(ConfigError(
                "status_timeout_ms must exceed inter_byte_timeout_ms",
            ));
        }
        if !(500..=60_000).contains(&self.poll_interval_ms) {
            return Err(ConfigError("poll_interval_ms must be 500–60000"));
        }
        if self.toggle_delay_ms < 20 {
            return Err(ConfigError("toggle_delay_ms must be ≥ 20"));
        }
        if self.subwoofer_step == 0 {
            return Err(ConfigError("subwoofer_step must be non-zero"));
        }
        if self.volume_max_steps == 0 || self.subwoofer_max_steps == 0 {
            return Err(ConfigError("toggle step caps must be non-zero"));
        }
        if !self.pairing_pin.iter().all(u8::is_ascii_digit) {
            return Err(ConfigError("pairing_pin must be four ASCII digits"));
        }
        if self.mqtt_base_topic.is_empty() || self.mqtt_base_topic.ends_with('/') {
            return Err(ConfigError("mqtt_base_topic must be non-empty without trailing '/'"));
        }
        if !(self.temperature_delta_c.is_finite() && self.temperature_delta_c > 0.0) {
            return Err(ConfigError("temperature_delta_c must be positive"));
        }
        Ok(())
    }
}
