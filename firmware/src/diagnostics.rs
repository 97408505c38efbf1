//! Link diagnostics.
//!
//! A serialisable snapshot of the connection state plus a couple of
//! runtime metrics, collected on demand for the debug endpoint and the
//! periodic log line.  Platform readings the core cannot see (Wi-Fi
//! signal, chip temperature) are attached by the caller and serialise as
//! `null` when absent.

use serde::Serialize;

use crate::connection::ConnectionState;
use crate::link::{BdAddr, LinkTarget};

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub connected: bool,
    pub paired: bool,
    pub status: &'static str,
    pub target_address: Option<BdAddr>,
    pub target_name: heapless::String<32>,
    pub connection_attempts: u32,
    pub successful_connections: u32,
    pub failed_connections: u32,
    pub disconnections: u32,
    pub last_connect_duration_ms: u64,
    /// Includes the open session.
    pub total_connected_time_ms: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub last_error: heapless::String<48>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f32>,
    pub uptime_ms: u64,
    pub heap_free: u32,
    pub wifi_rssi: Option<i8>,
    pub chip_temp_c: Option<f32>,
}

impl DiagnosticsReport {
    pub fn collect(state: &ConnectionState, target: &LinkTarget, now_ms: u64) -> Self {
        let stats = &state.stats;
        Self {
            connected: state.is_connected(),
            paired: state.is_paired,
            status: state.phase.as_str(),
            target_address: target.address,
            target_name: target.name.clone(),
            connection_attempts: stats.connect_attempts,
            successful_connections: stats.successful_connects,
            failed_connections: stats.failed_connects,
            disconnections: stats.disconnects,
            last_connect_duration_ms: stats.last_connect_duration_ms,
            total_connected_time_ms: state.connected_time_ms(now_ms),
            bytes_sent: stats.bytes_sent,
            bytes_received: stats.bytes_received,
            last_error: state.last_error.clone(),
            success_rate: state.success_rate(),
            uptime_ms: now_ms,
            heap_free: heap_free(),
            wifi_rssi: None,
            chip_temp_c: None,
        }
    }

    #[must_use]
    pub fn with_wifi_rssi(mut self, rssi: Option<i8>) -> Self {
        self.wifi_rssi = rssi;
        self
    }

    #[must_use]
    pub fn with_chip_temperature(mut self, celsius: Option<f32>) -> Self {
        self.chip_temp_c = celsius;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(target_os = "espidf")]
fn heap_free() -> u32 {
    // SAFETY: reads an allocator counter, no preconditions.
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

#[cfg(not(target_os = "espidf"))]
fn heap_free() -> u32 {
    // Nominal ESP32 free heap so host runs report plausible numbers.
    200_000
}
