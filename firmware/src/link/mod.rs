//! Link driver: connect policy and framed I/O over a [`SerialLink`].
//!
//! ```text
//!  ConnectionManager ──▶ LinkDriver ──▶ SerialLink (SPP adapter)
//!                          │   ▲
//!                          ▼   │
//!                        TimePort
//! ```
//!
//! The driver owns the only copy of the radio handle and the clock, so
//! every blocking wait in the bridge happens here with an explicit bound.

pub mod pairing;

use core::fmt;
use core::str::FromStr;

use log::{debug, info, warn};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::app::ports::{SerialLink, TimePort};
use crate::config::{BridgeConfig, NAME_CAPACITY};
use crate::error::LinkError;

/// Largest response the driver buffers.  A status report is 17 bytes.
pub const RESPONSE_CAPACITY: usize = 64;

/// One response as accumulated by [`LinkDriver::read_frame`].
pub type Response = heapless::Vec<u8, RESPONSE_CAPACITY>;

// ───────────────────────────────────────────────────────────────
// Bluetooth device address
// ───────────────────────────────────────────────────────────────

/// 48-bit Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseAddrError;

impl fmt::Display for ParseAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected six hex octets separated by ':'")
    }
}

impl std::error::Error for ParseAddrError {}

impl FromStr for BdAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for slot in &mut out {
            let part = parts.next().ok_or(ParseAddrError)?;
            if part.len() != 2 {
                return Err(ParseAddrError);
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseAddrError)?;
        }
        if parts.next().is_some() {
            return Err(ParseAddrError);
        }
        Ok(Self(out))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BdAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddrVisitor;

        impl Visitor<'_> for AddrVisitor {
            type Value = BdAddr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a Bluetooth address like \"00:11:22:33:44:55\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BdAddr, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(AddrVisitor)
    }
}

// ───────────────────────────────────────────────────────────────
// Connect target and route
// ───────────────────────────────────────────────────────────────

/// Where to connect: the address route is preferred, the name route is
/// the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub address: Option<BdAddr>,
    pub name: heapless::String<NAME_CAPACITY>,
}

impl LinkTarget {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            address: config.soundbar_address,
            name: config.soundbar_name.clone(),
        }
    }
}

/// Which route produced the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRoute {
    Address,
    Name,
}

// ───────────────────────────────────────────────────────────────
// LinkDriver
// ───────────────────────────────────────────────────────────────

pub struct LinkDriver<L, C> {
    link: L,
    clock: C,
    address_attempts: u8,
    address_retry_delay_ms: u32,
    stale_client_settle_ms: u32,
}

impl<L: SerialLink, C: TimePort> LinkDriver<L, C> {
    pub fn new(link: L, clock: C, config: &BridgeConfig) -> Self {
        Self {
            link,
            clock,
            address_attempts: config.address_connect_attempts.max(1),
            address_retry_delay_ms: config.address_retry_delay_ms,
            stale_client_settle_ms: config.stale_client_settle_ms,
        }
    }

    // ── Connect ───────────────────────────────────────────────

    /// Establish the link: address route first, name route second.
    ///
    /// Some soundbars only accept the second or third address connect
    /// after waking, so the address route is retried before giving up on it.
    pub fn connect(&mut self, target: &LinkTarget) -> Result<ConnectRoute, LinkError> {
        if self.link.has_client() {
            warn!("BT: stale client handle, tearing down");
            self.link.disconnect();
            self.clock.delay_ms(self.stale_client_settle_ms);
        }

        if let Some(addr) = target.address {
            let attempts = self.address_attempts;
            for attempt in 1..=attempts {
                info!("BT: connecting to {addr} (attempt {attempt}/{attempts})");
                if self.link.connect_address(&addr).is_ok() && self.link.is_connected() {
                    info!("BT: connected via address");
                    return Ok(ConnectRoute::Address);
                }
                if attempt < attempts {
                    self.clock.delay_ms(self.address_retry_delay_ms);
                }
            }
            warn!("BT: address route failed after {attempts} attempts");
        }

        if target.name.is_empty() {
            return Err(LinkError::ConnectFailed);
        }

        info!("BT: discovering '{}'", target.name);
        match self.link.connect_name(&target.name) {
            Ok(()) if self.link.is_connected() => {
                info!("BT: connected via name");
                Ok(ConnectRoute::Name)
            }
            Ok(()) => Err(LinkError::ConnectFailed),
            Err(e) => {
                warn!("BT: name route failed: {e}");
                Err(LinkError::ConnectFailed)
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.link.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn peer_address(&self) -> Option<BdAddr> {
        self.link.peer_address()
    }

    pub fn remove_bond(&mut self, addr: &BdAddr) -> Result<(), LinkError> {
        self.link.remove_bond(addr)
    }

    // ── I/O ───────────────────────────────────────────────────

    /// Hand `data` to the radio.  Returns the number of bytes accepted;
    /// a short count is the caller's failure to handle.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.link.write(data)
    }

    /// Drop everything already buffered.  Returns how many bytes went.
    pub fn flush_input(&mut self) -> usize {
        let mut dropped = 0;
        while self.link.read_byte().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("BT: flushed {dropped} stale bytes");
        }
        dropped
    }

    /// Collect one response of unknown length.
    ///
    /// Returns when `timeout_ms` has elapsed overall, or when at least one
    /// byte has arrived and the line has then been idle for
    /// `inter_byte_ms`.  An empty result means nothing arrived.
    pub fn read_frame(&mut self, timeout_ms: u32, inter_byte_ms: u32) -> Response {
        let mut buf = Response::new();
        let start = self.clock.now_ms();
        let mut last_byte_ms: Option<u64> = None;

        loop {
            let mut received = false;
            while let Some(b) = self.link.read_byte() {
                if buf.push(b).is_err() {
                    warn!("BT: response exceeds {RESPONSE_CAPACITY} bytes, truncating");
                    return buf;
                }
                received = true;
            }

            let now = self.clock.now_ms();
            if received {
                last_byte_ms = Some(now);
            }
            if now.saturating_sub(start) >= u64::from(timeout_ms) {
                break;
            }
            if let Some(t) = last_byte_ms {
                if now.saturating_sub(t) >= u64::from(inter_byte_ms) {
                    break;
                }
            }
            self.clock.delay_ms(1);
        }

        buf
    }

    // ── Clock access ──────────────────────────────────────────

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms);
    }
}
