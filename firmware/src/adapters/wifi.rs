//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`]: the hexagonal boundary for network
//! connectivity.  The MQTT client rides on top and reconnects by itself
//! once the station is back.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! On disconnect the adapter retries on a fixed interval (5 s by default),
//! checked from the scheduler loop via [`ConnectivityPort::poll`].

use core::fmt;
use log::{error, info, warn};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

pub trait ConnectivityPort {
    fn connect(&mut self, now_ms: u64) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Detect link loss and retry when the interval has elapsed.
    fn poll(&mut self, now_ms: u64);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    if !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    retry_ms: u32,
    last_attempt_ms: u64,
    last_rssi: Option<i8>,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    /// Simulation: whether the pretend AP is reachable.
    #[cfg(not(target_os = "espidf"))]
    sim_ap_up: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>, retry_ms: u32) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            retry_ms,
            last_attempt_ms: 0,
            last_rssi: None,
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(retry_ms: u32) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            retry_ms,
            last_attempt_ms: 0,
            last_rssi: None,
            sim_ap_up: true,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Simulation: make the pretend AP (un)reachable.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_ap(&mut self, up: bool) {
        self.sim_ap_up = up;
    }

    fn attempt(&mut self, now_ms: u64) -> Result<(), ConnectivityError> {
        self.last_attempt_ms = now_ms;
        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.last_rssi = self.platform_rssi();
                info!("WiFi: connected (RSSI={:?})", self.last_rssi);
                Ok(())
            }
            Err(e) => {
                let attempt = match self.state {
                    WifiState::Reconnecting { attempt } => attempt + 1,
                    _ => 0,
                };
                self.state = WifiState::Reconnecting { attempt };
                Err(e)
            }
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        let result = (|| {
            self.wifi.set_configuration(&conf)?;
            if !self.wifi.is_started()? {
                self.wifi.start()?;
            }
            self.wifi.connect()?;
            self.wifi.wait_netif_up()
        })();
        result.map_err(|e| {
            error!("WiFi: connect failed: {e}");
            ConnectivityError::ConnectionFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if !self.sim_ap_up {
            warn!("WiFi(sim): AP '{}' unreachable", self.ssid);
            return Err(ConnectivityError::ConnectionFailed);
        }
        info!("WiFi(sim): connected to '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed: {e}");
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.sim_ap_up
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::{esp_wifi_sta_get_ap_info, wifi_ap_record_t, ESP_OK};
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        // SAFETY: `ap_info` is a valid out-pointer for the duration of the call.
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == ESP_OK).then_some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        (self.state == WifiState::Connected).then_some(-60)
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self, now_ms: u64) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting;
        self.attempt(now_ms).inspect_err(|e| error!("WiFi: connection failed: {e}"))
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        self.last_rssi = None;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn poll(&mut self, now_ms: u64) {
        match self.state {
            WifiState::Reconnecting { attempt } => {
                if now_ms.saturating_sub(self.last_attempt_ms) < u64::from(self.retry_ms) {
                    return;
                }
                info!("WiFi: reconnect attempt {}", attempt + 1);
                let _ = self.attempt(now_ms);
            }
            WifiState::Connected => {
                if self.platform_is_connected() {
                    self.last_rssi = self.platform_rssi();
                } else {
                    warn!("WiFi: connection lost, retrying every {} ms", self.retry_ms);
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.last_attempt_ms = now_ms;
                    self.last_rssi = None;
                }
            }
            _ => {}
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        self.last_rssi
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
