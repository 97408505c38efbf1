//! Mock adapters for integration tests.
//!
//! Every mock hands out a cloneable handle onto shared state, so a test can
//! keep inspecting (and scripting) the link, clock, and store after they
//! have been moved into the service under test.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use yas_bridge::app::events::AppEvent;
use yas_bridge::app::ports::{EventSink, PersistencePort, SerialLink, StorageError, TimePort};
use yas_bridge::app::service::BridgeService;
use yas_bridge::config::BridgeConfig;
use yas_bridge::connection::ConnectionManager;
use yas_bridge::error::LinkError;
use yas_bridge::link::{BdAddr, LinkDriver};
use yas_bridge::protocol::codec;
use yas_bridge::protocol::commands::{self, COMMANDS};
use yas_bridge::protocol::status::{InputSource, StatusRecord, SurroundMode};

pub const SOUNDBAR: BdAddr = BdAddr([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]);

pub fn status(volume: u8, subwoofer: u8) -> StatusRecord {
    StatusRecord {
        power: true,
        input: InputSource::Hdmi,
        muted: false,
        volume,
        subwoofer,
        surround: SurroundMode::Movie,
        bass_ext: false,
        clear_voice: false,
        valid: true,
    }
}

// ── FakeClock ─────────────────────────────────────────────────

/// Manual clock.  `delay_ms` advances time instead of sleeping.
#[derive(Clone, Default)]
pub struct FakeClock {
    now: Rc<Cell<u64>>,
}

#[allow(dead_code)]
impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }
}

impl TimePort for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(u64::from(ms));
    }
}

// ── MockStore ─────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockStore {
    values: Rc<RefCell<HashMap<String, bool>>>,
    full: Rc<Cell<bool>>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write fail as if the partition were full.
    pub fn fill(&self) {
        self.full.set(true);
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.values.borrow().get(key).copied()
    }
}

impl PersistencePort for MockStore {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).unwrap_or(default)
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), StorageError> {
        if self.full.get() {
            return Err(StorageError::Full);
        }
        self.values.borrow_mut().insert(key.to_owned(), value);
        Ok(())
    }
}

// ── MockLink ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    ConnectAddress(BdAddr),
    ConnectName(String),
    Disconnect,
    RemoveBond(BdAddr),
}

/// Scripted radio behaviour plus a record of everything the bridge did.
pub struct LinkScript {
    /// Results for successive address attempts; `address_default` after.
    pub address_results: VecDeque<bool>,
    pub address_default: bool,
    pub name_ok: bool,
    pub connected: bool,
    pub client: bool,
    pub peer: Option<BdAddr>,
    /// Bytes with the time they become readable.
    pub rx: VecDeque<(u64, u8)>,
    /// Accepted writes with their timestamp.
    pub writes: Vec<(u64, Vec<u8>)>,
    pub calls: Vec<LinkCall>,
    /// What the soundbar answers to `report_status`; `None` stays silent.
    pub status: Option<StatusRecord>,
    /// Full writes accepted before every write comes back short.
    pub writes_left: Option<usize>,
}

impl Default for LinkScript {
    fn default() -> Self {
        Self {
            address_results: VecDeque::new(),
            address_default: true,
            name_ok: true,
            connected: false,
            client: false,
            peer: None,
            rx: VecDeque::new(),
            writes: Vec::new(),
            calls: Vec::new(),
            status: Some(status(15, 16)),
            writes_left: None,
        }
    }
}

pub struct MockLink {
    script: Rc<RefCell<LinkScript>>,
    clock: FakeClock,
}

impl MockLink {
    pub fn new(script: Rc<RefCell<LinkScript>>, clock: FakeClock) -> Self {
        Self { script, clock }
    }
}

fn command_for(frame: &[u8]) -> Option<&'static str> {
    COMMANDS
        .iter()
        .find(|c| codec::encode_payload(c.payload).is_some_and(|f| f.as_slice() == frame))
        .map(|c| c.name)
}

impl SerialLink for MockLink {
    fn connect_address(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        let mut s = self.script.borrow_mut();
        s.calls.push(LinkCall::ConnectAddress(*addr));
        s.client = true;
        let ok = s.address_results.pop_front().unwrap_or(s.address_default);
        if ok {
            s.connected = true;
            s.peer = Some(*addr);
            Ok(())
        } else {
            Err(LinkError::ConnectFailed)
        }
    }

    fn connect_name(&mut self, name: &str) -> Result<(), LinkError> {
        let mut s = self.script.borrow_mut();
        s.calls.push(LinkCall::ConnectName(name.to_owned()));
        s.client = true;
        if s.name_ok {
            s.connected = true;
            s.peer = Some(SOUNDBAR);
            Ok(())
        } else {
            Err(LinkError::ConnectFailed)
        }
    }

    fn is_connected(&self) -> bool {
        self.script.borrow().connected
    }

    fn has_client(&self) -> bool {
        self.script.borrow().client
    }

    fn disconnect(&mut self) {
        let mut s = self.script.borrow_mut();
        s.calls.push(LinkCall::Disconnect);
        s.connected = false;
        s.client = false;
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let now = self.clock.now();
        let mut guard = self.script.borrow_mut();
        let s = &mut *guard;
        if !s.connected {
            return 0;
        }
        match s.writes_left {
            Some(0) => return 0,
            Some(n) => s.writes_left = Some(n - 1),
            None => {}
        }
        s.writes.push((now, data.to_vec()));

        let Some(status) = s.status.as_mut() else {
            return data.len();
        };
        match command_for(data) {
            Some(commands::REPORT_STATUS) => {
                let reply = codec::status_frame(status);
                s.rx.extend(reply.iter().map(|&b| (now, b)));
            }
            Some(commands::VOLUME_UP) => status.volume = (status.volume + 1).min(50),
            Some(commands::VOLUME_DOWN) => status.volume = status.volume.saturating_sub(1),
            Some(commands::SUBWOOFER_UP) => status.subwoofer = (status.subwoofer + 4).min(32),
            Some(commands::SUBWOOFER_DOWN) => status.subwoofer = status.subwoofer.saturating_sub(4),
            _ => {}
        }
        data.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let now = self.clock.now();
        let mut s = self.script.borrow_mut();
        if s.rx.front().is_some_and(|&(at, _)| at <= now) {
            s.rx.pop_front().map(|(_, b)| b)
        } else {
            None
        }
    }

    fn peer_address(&self) -> Option<BdAddr> {
        self.script.borrow().peer
    }

    fn remove_bond(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        self.script.borrow_mut().calls.push(LinkCall::RemoveBond(*addr));
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link_statuses(&self) -> Vec<&'static str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::LinkStatus(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<StatusRecord> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StatusChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn availability(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Availability(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type TestManager = ConnectionManager<MockLink, FakeClock, MockStore>;
pub type TestService = BridgeService<MockLink, FakeClock, MockStore>;

/// Handles onto the mocks behind a manager or service.
#[derive(Clone)]
pub struct Rig {
    pub script: Rc<RefCell<LinkScript>>,
    pub clock: FakeClock,
    pub store: MockStore,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self {
            script: Rc::new(RefCell::new(LinkScript::default())),
            clock: FakeClock::new(),
            store: MockStore::new(),
        }
    }

    pub fn manager(&self, config: &BridgeConfig) -> TestManager {
        let link = MockLink::new(Rc::clone(&self.script), self.clock.clone());
        let driver = LinkDriver::new(link, self.clock.clone(), config);
        ConnectionManager::new(driver, self.store.clone(), config)
    }

    pub fn service(&self, config: &BridgeConfig) -> TestService {
        BridgeService::new(self.manager(config), config)
    }

    /// Command names written so far, in order.
    pub fn sent(&self) -> Vec<&'static str> {
        self.script
            .borrow()
            .writes
            .iter()
            .filter_map(|(_, f)| command_for(f))
            .collect()
    }

    /// Timestamps of every write of `name`.
    pub fn sent_at(&self, name: &str) -> Vec<u64> {
        self.script
            .borrow()
            .writes
            .iter()
            .filter(|(_, f)| command_for(f) == Some(name))
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.script.borrow().calls.clone()
    }

    pub fn clear_writes(&self) {
        self.script.borrow_mut().writes.clear();
    }

    pub fn set_status(&self, record: Option<StatusRecord>) {
        self.script.borrow_mut().status = record;
    }

    /// Queue raw bytes that become readable at `at_ms`.
    pub fn queue_rx(&self, at_ms: u64, bytes: &[u8]) {
        self.script
            .borrow_mut()
            .rx
            .extend(bytes.iter().map(|&b| (at_ms, b)));
    }

    /// The radio drops the link without the bridge asking.
    pub fn drop_link(&self) {
        self.script.borrow_mut().connected = false;
    }
}

/// Default config with the soundbar address set.
pub fn config_with_address() -> BridgeConfig {
    BridgeConfig {
        soundbar_address: Some(SOUNDBAR),
        ..BridgeConfig::default()
    }
}
