//! Bluetooth Classic SPP adapter.
//!
//! Implements [`SerialLink`] over a single RFCOMM client channel.
//!
//! - **`target_os = "espidf"`**: Bluedroid SPP in callback mode.  The
//!   controller and host stack come up through `BtDriver<BtClassic>`; GAP
//!   and SPP callbacks live in the private `esp_impl` module and forward
//!   pairing events to an [`AutoPairing`] handler.
//! - **`not(target_os = "espidf")`**: an in-process [`SimSoundbar`] that
//!   answers status requests and applies volume and subwoofer toggles, so
//!   the full bridge can run on a workstation.

#[cfg(target_os = "espidf")]
mod esp_impl;

use log::{debug, info};

use crate::app::ports::SerialLink;
use crate::config::BridgeConfig;
use crate::error::LinkError;
use crate::link::BdAddr;
use crate::link::pairing::AutoPairing;

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

#[cfg(not(target_os = "espidf"))]
use crate::protocol::{codec, commands, status::StatusRecord};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    bt::{BtClassic, BtDriver},
    hal::{modem::BluetoothModemPeripheral, peripheral::Peripheral},
    nvs::EspDefaultNvsPartition,
};

/// Append received bytes to a bounded buffer; when it is full the oldest
/// byte gives way, so a scheduler that falls behind loses stale input
/// rather than the newest response.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
pub(crate) fn buffer_rx<const N: usize>(rx: &mut heapless::Deque<u8, N>, data: &[u8]) {
    for &b in data {
        if rx.is_full() {
            rx.pop_front();
        }
        let _ = rx.push_back(b);
    }
}

// ───────────────────────────────────────────────────────────────
// SppLink
// ───────────────────────────────────────────────────────────────

pub struct SppLink {
    #[cfg(target_os = "espidf")]
    _driver: BtDriver<'static, BtClassic>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimSoundbar,
    #[cfg(not(target_os = "espidf"))]
    connected: bool,
    #[cfg(not(target_os = "espidf"))]
    client: bool,
    #[cfg(not(target_os = "espidf"))]
    peer: Option<BdAddr>,
    #[cfg(not(target_os = "espidf"))]
    rx: VecDeque<u8>,
}

impl SppLink {
    /// Bring up the Classic controller and Bluedroid, then register SPP.
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: impl Peripheral<P = impl BluetoothModemPeripheral> + 'static,
        nvs: EspDefaultNvsPartition,
        config: &BridgeConfig,
    ) -> crate::error::Result<Self> {
        let driver = BtDriver::<BtClassic>::new(modem, Some(nvs))
            .map_err(|_| crate::error::Error::Init("bt_driver"))?;
        esp_impl::init(&config.device_name, AutoPairing::new(config.pairing_pin))
            .map_err(crate::error::Error::Init)?;
        Ok(Self { _driver: driver })
    }

    /// Host simulation against `soundbar`.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(soundbar: SimSoundbar) -> Self {
        Self {
            sim: soundbar,
            connected: false,
            client: false,
            peer: None,
            rx: VecDeque::new(),
        }
    }

    /// Host simulation with a default soundbar matching `config`.
    #[cfg(not(target_os = "espidf"))]
    pub fn from_config(config: &BridgeConfig) -> Self {
        let mut bar = SimSoundbar::new(&config.soundbar_name);
        if let Some(addr) = config.soundbar_address {
            bar.address = addr;
        }
        bar.pairing = AutoPairing::new(config.pairing_pin);
        Self::simulated(bar)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn soundbar(&self) -> &SimSoundbar {
        &self.sim
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn soundbar_mut(&mut self) -> &mut SimSoundbar {
        &mut self.sim
    }

    /// Simulate the soundbar dropping the link.  The client handle stays
    /// held, as it would on the radio.
    #[cfg(not(target_os = "espidf"))]
    pub fn drop_link(&mut self) {
        self.connected = false;
        self.rx.clear();
    }

    #[cfg(not(target_os = "espidf"))]
    fn open(&mut self, addr: BdAddr) -> Result<(), LinkError> {
        self.client = true;
        if !self.sim.accept_connection() {
            return Err(LinkError::ConnectFailed);
        }
        if !self.sim.bonded {
            use crate::link::pairing::PairingHandler;
            let accepted = self.sim.pairing.on_pin_request(&addr).is_some();
            self.sim.pairing.on_auth_complete(accepted, &self.sim.name);
            if !accepted {
                return Err(LinkError::ConnectFailed);
            }
            self.sim.bonded = true;
        }
        self.connected = true;
        self.peer = Some(addr);
        info!("BT: simulated channel open to {addr}");
        Ok(())
    }
}

// ── SerialLink (ESP-IDF) ──────────────────────────────────────

#[cfg(target_os = "espidf")]
impl SerialLink for SppLink {
    fn connect_address(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        debug!("BT: connecting to {addr}");
        esp_impl::open(addr)
    }

    fn connect_name(&mut self, name: &str) -> Result<(), LinkError> {
        info!("BT: searching for '{name}'");
        let addr = esp_impl::find_by_name(name).ok_or(LinkError::ConnectFailed)?;
        esp_impl::open(&addr)
    }

    fn is_connected(&self) -> bool {
        let s = esp_impl::shared();
        s.phase == esp_impl::OpenPhase::Open && s.handle.is_some()
    }

    fn has_client(&self) -> bool {
        let s = esp_impl::shared();
        s.handle.is_some() || s.phase != esp_impl::OpenPhase::Idle
    }

    fn disconnect(&mut self) {
        esp_impl::close();
    }

    fn write(&mut self, data: &[u8]) -> usize {
        esp_impl::write(data)
    }

    fn read_byte(&mut self) -> Option<u8> {
        esp_impl::shared().rx.pop_front()
    }

    fn peer_address(&self) -> Option<BdAddr> {
        esp_impl::shared().peer.map(BdAddr)
    }

    fn remove_bond(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        esp_impl::remove_bond(addr)
    }
}

// ── SerialLink (host simulation) ──────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl SerialLink for SppLink {
    fn connect_address(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        debug!("BT: connecting to {addr}");
        if *addr != self.sim.address {
            self.client = true;
            return Err(LinkError::ConnectFailed);
        }
        self.open(*addr)
    }

    fn connect_name(&mut self, name: &str) -> Result<(), LinkError> {
        info!("BT: searching for '{name}'");
        if name != self.sim.name {
            return Err(LinkError::ConnectFailed);
        }
        self.open(self.sim.address)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn has_client(&self) -> bool {
        self.client
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.client = false;
        self.rx.clear();
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if !self.connected {
            return 0;
        }
        if let Some(reply) = self.sim.receive(data) {
            self.rx.extend(reply);
        }
        data.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn peer_address(&self) -> Option<BdAddr> {
        self.peer
    }

    fn remove_bond(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        if *addr == self.sim.address {
            self.sim.bonded = false;
            info!("BT: bond removed for {addr}");
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// SimSoundbar
// ───────────────────────────────────────────────────────────────

/// Simulated soundbar state machine used by host builds.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
pub struct SimSoundbar {
    pub name: String,
    pub address: BdAddr,
    pub status: StatusRecord,
    /// Connections refused while `false`.
    pub reachable: bool,
    /// Connection attempts to refuse before accepting.
    pub wake_attempts: u32,
    pub bonded: bool,
    /// Status requests go unanswered while `true`.
    pub silent: bool,
    pub pairing: AutoPairing,
    /// Every command name received, oldest first.
    pub received: Vec<&'static str>,
}

#[cfg(not(target_os = "espidf"))]
impl SimSoundbar {
    const VOLUME_MAX: u8 = 50;
    const SUBWOOFER_MAX: u8 = 32;
    const SUBWOOFER_STEP: u8 = 4;

    pub fn new(name: &str) -> Self {
        use crate::protocol::status::{InputSource, SurroundMode};
        Self {
            name: name.to_owned(),
            address: BdAddr([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]),
            status: StatusRecord {
                power: true,
                input: InputSource::Hdmi,
                muted: false,
                volume: 15,
                subwoofer: 16,
                surround: SurroundMode::Movie,
                bass_ext: false,
                clear_voice: false,
                valid: true,
            },
            reachable: true,
            wake_attempts: 0,
            bonded: false,
            silent: false,
            pairing: AutoPairing::new(*b"0000"),
            received: Vec::new(),
        }
    }

    fn accept_connection(&mut self) -> bool {
        if !self.reachable {
            return false;
        }
        if self.wake_attempts > 0 {
            self.wake_attempts -= 1;
            return false;
        }
        true
    }

    /// Apply one framed command.  Returns the reply frame, if any.
    fn receive(&mut self, frame: &[u8]) -> Option<codec::Frame> {
        let cmd = commands::COMMANDS
            .iter()
            .find(|c| codec::encode_payload(c.payload).is_some_and(|f| f.as_slice() == frame))?;
        self.received.push(cmd.name);

        let s = &mut self.status;
        match cmd.name {
            commands::REPORT_STATUS => {
                return (!self.silent).then(|| codec::status_frame(s));
            }
            commands::VOLUME_UP => s.volume = s.volume.saturating_add(1).min(Self::VOLUME_MAX),
            commands::VOLUME_DOWN => s.volume = s.volume.saturating_sub(1),
            commands::SUBWOOFER_UP => {
                s.subwoofer = s.subwoofer.saturating_add(Self::SUBWOOFER_STEP).min(Self::SUBWOOFER_MAX);
            }
            commands::SUBWOOFER_DOWN => s.subwoofer = s.subwoofer.saturating_sub(Self::SUBWOOFER_STEP),
            "power_on" => s.power = true,
            "power_off" => s.power = false,
            "power_toggle" => s.power = !s.power,
            "mute_on" => s.muted = true,
            "mute_off" => s.muted = false,
            "mute_toggle" => s.muted = !s.muted,
            "bass_ext_on" => s.bass_ext = true,
            "bass_ext_off" => s.bass_ext = false,
            "bass_ext_toggle" => s.bass_ext = !s.bass_ext,
            "clearvoice_on" => s.clear_voice = true,
            "clearvoice_off" => s.clear_voice = false,
            "clearvoice_toggle" => s.clear_voice = !s.clear_voice,
            _ => {}
        }
        None
    }
}
