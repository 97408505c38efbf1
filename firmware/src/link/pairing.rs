//! Pairing callbacks.
//!
//! The Bluetooth stack drives pairing from its own task; the SPP adapter
//! forwards each GAP event to a [`PairingHandler`] and relays the answer.
//! The soundbar has no display or keypad, so the only policy that works
//! is fixed-PIN legacy pairing plus Just Works confirmation.

use log::{info, warn};

use super::BdAddr;

/// Security mode reported by the stack after a link-mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Active,
    Hold,
    Sniff,
    Park,
    Other(u8),
}

impl LinkMode {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Hold,
            2 => Self::Sniff,
            3 => Self::Park,
            other => Self::Other(other),
        }
    }
}

/// Narrow capability the radio adapter calls into during pairing.
pub trait PairingHandler {
    /// Authentication finished.  Observational only.
    fn on_auth_complete(&self, success: bool, peer_name: &str);

    /// Legacy PIN request.  `None` rejects the request.
    fn on_pin_request(&self, peer: &BdAddr) -> Option<[u8; 4]>;

    /// Secure Simple Pairing numeric comparison.  `true` confirms.
    fn on_confirm_request(&self, peer: &BdAddr, passkey: u32) -> bool;

    /// Power-mode change on an established link.  Observational only.
    fn on_mode_change(&self, peer: &BdAddr, mode: LinkMode);
}

/// Fixed PIN, auto-confirm.
#[derive(Debug, Clone, Copy)]
pub struct AutoPairing {
    pin: [u8; 4],
}

impl AutoPairing {
    pub const fn new(pin: [u8; 4]) -> Self {
        Self { pin }
    }
}

impl PairingHandler for AutoPairing {
    fn on_auth_complete(&self, success: bool, peer_name: &str) {
        if success {
            info!("BT: authentication complete with '{peer_name}'");
        } else {
            warn!("BT: authentication failed with '{peer_name}'");
        }
    }

    fn on_pin_request(&self, peer: &BdAddr) -> Option<[u8; 4]> {
        info!("BT: PIN requested by {peer}, replying");
        Some(self.pin)
    }

    fn on_confirm_request(&self, peer: &BdAddr, passkey: u32) -> bool {
        info!("BT: confirm passkey {passkey:06} from {peer} (Just Works)");
        true
    }

    fn on_mode_change(&self, peer: &BdAddr, mode: LinkMode) {
        info!("BT: {peer} mode -> {mode:?}");
    }
}
