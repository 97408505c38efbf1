//! Connection manager: the link lifecycle state machine.
//!
//! ```text
//!               connect()            ok
//!  Disconnected ─────────▶ Connecting ──▶ Connected
//!       ▲                      │              │
//!       │                      └─ err ─▶ ConnectFailed
//!       └──────── link lost (edge, once) ─────┘
//!
//!  any ── reset_pairing() ──▶ PairingReset  (hold-off armed)
//! ```
//!
//! Driven once per scheduler tick: [`tick`](ConnectionManager::tick)
//! detects edges, [`poll_reconnect`](ConnectionManager::poll_reconnect)
//! applies the backoff and hold-off gates.  Nothing here runs on its own
//! thread.

pub mod state;

use log::{debug, error, info, warn};

use crate::app::ports::{PersistencePort, SerialLink, TimePort};
use crate::config::BridgeConfig;
use crate::error::{CommandError, Error, LinkError, Result};
use crate::link::{BdAddr, LinkDriver, LinkTarget};
use crate::protocol::codec::{self, HexDump};
use crate::protocol::commands;
use crate::protocol::status::StatusRecord;

pub use state::{ConnectionState, LinkPhase, LinkStats};

/// Persistence key for the "ever paired" flag.
pub const PAIRED_KEY: &str = "paired";

/// A link transition observed by [`ConnectionManager::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEdge {
    /// The radio reports a link the manager had not recorded.
    Up,
    /// A recorded link is gone.
    Down { connected_for_ms: u64 },
}

pub struct ConnectionManager<L, C, P> {
    driver: LinkDriver<L, C>,
    store: P,
    target: LinkTarget,
    state: ConnectionState,
    reconnect_backoff_ms: u32,
    pairing_hold_off_ms: u32,
    status_timeout_ms: u32,
    inter_byte_timeout_ms: u32,
    verify_status_checksum: bool,
}

impl<L: SerialLink, C: TimePort, P: PersistencePort> ConnectionManager<L, C, P> {
    /// Build the manager, loading `is_paired` from `store`.
    pub fn new(driver: LinkDriver<L, C>, store: P, config: &BridgeConfig) -> Self {
        let is_paired = store.get_bool(PAIRED_KEY, false);
        info!("BT: previously paired: {is_paired}");
        Self {
            driver,
            store,
            target: LinkTarget::from_config(config),
            state: ConnectionState::new(is_paired),
            reconnect_backoff_ms: config.reconnect_backoff_ms,
            pairing_hold_off_ms: config.pairing_hold_off_ms,
            status_timeout_ms: config.status_timeout_ms,
            inter_byte_timeout_ms: config.inter_byte_timeout_ms,
            verify_status_checksum: config.verify_status_checksum,
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn target(&self) -> &LinkTarget {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.driver.is_connected()
    }

    pub fn now_ms(&self) -> u64 {
        self.driver.now_ms()
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.driver.delay_ms(ms);
    }

    // ── Connect / reconnect ───────────────────────────────────

    /// Bring the link up.  A no-op when it already is.
    pub fn connect(&mut self) -> Result<()> {
        if self.driver.is_connected() {
            if !self.state.is_connected() {
                self.mark_up(self.driver.now_ms());
            }
            return Ok(());
        }

        let start = self.driver.now_ms();
        self.state.last_attempt_ms = Some(start);
        self.state.stats.connect_attempts += 1;
        self.state.phase = LinkPhase::Connecting;

        let result = self.driver.connect(&self.target);
        let now = self.driver.now_ms();
        self.state.stats.last_connect_duration_ms = now.saturating_sub(start);

        match result {
            Ok(route) => {
                self.state.stats.successful_connects += 1;
                self.mark_up(now);
                if !self.state.is_paired {
                    if let Err(e) = self.persist_paired(true) {
                        warn!("BT: could not persist pairing flag: {e}");
                    }
                }
                info!(
                    "BT: connected via {route:?} in {} ms",
                    self.state.stats.last_connect_duration_ms
                );
                Ok(())
            }
            Err(e) => {
                self.state.stats.failed_connects += 1;
                self.state.phase = LinkPhase::ConnectFailed;
                let attempt = self.state.stats.connect_attempts;
                self.state.set_error(format_args!("attempt_{attempt}"));
                warn!("BT: connect attempt {attempt} failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Manual reconnect: bypasses hold-off and backoff.
    pub fn connect_now(&mut self) -> Result<()> {
        self.state.hold_off_until_ms = 0;
        self.state.last_attempt_ms = None;
        self.connect()
    }

    /// Whether the periodic loop may try to connect at `now_ms`.
    pub fn reconnect_due(&self, now_ms: u64) -> bool {
        if self.state.is_connected() || now_ms < self.state.hold_off_until_ms {
            return false;
        }
        match self.state.last_attempt_ms {
            None => true,
            Some(t) => now_ms.saturating_sub(t) >= u64::from(self.reconnect_backoff_ms),
        }
    }

    /// Connect if [`reconnect_due`](Self::reconnect_due).  `None` when gated.
    pub fn poll_reconnect(&mut self) -> Option<Result<()>> {
        let now = self.driver.now_ms();
        if !self.reconnect_due(now) {
            return None;
        }
        debug!("BT: reconnect due");
        Some(self.connect())
    }

    /// Compare the live link against the recorded phase.  Each transition
    /// is reported exactly once.
    pub fn tick(&mut self) -> Option<LinkEdge> {
        let live = self.driver.is_connected();
        let now = self.driver.now_ms();
        match (self.state.is_connected(), live) {
            (true, false) => {
                let connected_for_ms = self.close_session(now);
                self.state.phase = LinkPhase::Disconnected;
                self.driver.disconnect();
                warn!("BT: link lost after {connected_for_ms} ms");
                Some(LinkEdge::Down { connected_for_ms })
            }
            (false, true) if self.state.phase != LinkPhase::Connecting => {
                info!("BT: link came up");
                self.mark_up(now);
                Some(LinkEdge::Up)
            }
            _ => None,
        }
    }

    /// Forget the bond and hold automatic reconnect off for a while.
    ///
    /// Bond-removal failures are logged and otherwise ignored.
    pub fn reset_pairing(&mut self) {
        let now = self.driver.now_ms();
        info!("BT: resetting pairing");

        if let Err(e) = self.persist_paired(false) {
            error!("BT: could not clear pairing flag: {e}");
        }

        match self.bond_address() {
            Some(addr) => {
                if let Err(e) = self.driver.remove_bond(&addr) {
                    warn!("BT: {e}");
                }
            }
            None => debug!("BT: no known peer address, nothing to unbond"),
        }

        if self.state.is_connected() || self.driver.is_connected() {
            self.close_session(now);
            self.driver.disconnect();
        }

        self.state.hold_off_until_ms = now + u64::from(self.pairing_hold_off_ms);
        self.state.phase = LinkPhase::PairingReset;
        info!("BT: auto-reconnect held off for {} ms", self.pairing_hold_off_ms);
    }

    /// Update `is_paired` and write it through.  The in-memory flag changes
    /// even when the write fails.
    fn persist_paired(&mut self, paired: bool) -> Result<()> {
        self.state.is_paired = paired;
        self.store.put_bool(PAIRED_KEY, paired)?;
        Ok(())
    }

    fn bond_address(&self) -> Option<BdAddr> {
        self.target.address.or_else(|| self.driver.peer_address())
    }

    fn mark_up(&mut self, now: u64) {
        self.state.phase = LinkPhase::Connected;
        self.state.connected_since_ms = Some(now);
        self.state.clear_error();
    }

    /// Fold the open session into the totals.  Returns its length.
    fn close_session(&mut self, now: u64) -> u64 {
        let session = self
            .state
            .connected_since_ms
            .take()
            .map_or(0, |since| now.saturating_sub(since));
        self.state.stats.total_connected_ms += session;
        self.state.stats.disconnects += 1;
        session
    }

    // ── Requests ──────────────────────────────────────────────

    /// Frame and send one named command.
    pub fn send_command(&mut self, name: &str) -> Result<()> {
        let frame = codec::encode(name).ok_or(CommandError::Unknown)?;
        if !self.is_connected() {
            return Err(LinkError::NotConnected.into());
        }
        self.write_frame(name, &frame)
    }

    /// Ask for a status report and decode the answer.
    pub fn request_status(&mut self) -> Result<StatusRecord> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected.into());
        }
        self.driver.flush_input();

        let frame = codec::encode(commands::REPORT_STATUS).ok_or(CommandError::Unknown)?;
        self.write_frame(commands::REPORT_STATUS, &frame)?;

        let response = self
            .driver
            .read_frame(self.status_timeout_ms, self.inter_byte_timeout_ms);
        self.state.stats.bytes_received += response.len() as u64;
        if response.is_empty() {
            warn!("STATUS: no response within {} ms", self.status_timeout_ms);
            return Err(LinkError::NoResponse.into());
        }
        debug!("STATUS RX ({} bytes): {}", response.len(), HexDump(&response));

        let record = codec::decode(&response);
        if !record.is_valid() {
            warn!("STATUS: not a status report");
            return Err(Error::Decode);
        }
        if self.verify_status_checksum && !codec::status_checksum_ok(&response) {
            warn!("STATUS: checksum mismatch or missing ({} bytes)", response.len());
            return Err(Error::Decode);
        }
        Ok(record)
    }

    fn write_frame(&mut self, name: &str, frame: &[u8]) -> Result<()> {
        let written = self.driver.write(frame);
        self.state.stats.bytes_sent += written as u64;
        debug!("CMD TX: {name} [{}]", HexDump(frame));
        if written != frame.len() {
            self.state.set_error(format_args!("write_failed_{name}"));
            error!("CMD TX: {name} short write ({written}/{})", frame.len());
            return Err(LinkError::ShortWrite {
                written,
                expected: frame.len(),
            }
            .into());
        }
        Ok(())
    }
}
