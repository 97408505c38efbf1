//! Inbound commands to the bridge service.
//!
//! These represent actions requested by the outside world (MQTT, a local
//! request/response surface) that the
//! [`BridgeService`](super::service::BridgeService) interprets and acts upon.
//! Everything is validated here, before any Bluetooth I/O.

use crate::config::BridgeConfig;
use crate::error::CommandError;
use crate::protocol::commands;

/// Subtopics under the MQTT base topic that carry commands.
pub mod topic {
    pub const COMMAND: &str = "command";
    pub const SET_VOLUME: &str = "set_volume";
    pub const SET_SUBWOOFER: &str = "set_subwoofer";
    pub const RECONNECT: &str = "reconnect";
    pub const RESTART: &str = "restart";
    pub const RESET_PAIRING: &str = "reset_pairing";
}

/// Commands that external adapters can send into the bridge core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Send a named soundbar command.  With `refresh`, poll and publish
    /// the resulting status afterwards.
    Send {
        name: &'static str,
        refresh: bool,
    },

    /// Converge volume on an absolute value.
    SetVolume(u8),

    /// Converge subwoofer level on an absolute value.
    SetSubwoofer(u8),

    /// Connect immediately, ignoring backoff and hold-off.
    Reconnect,

    /// Drop the bond and hold automatic reconnect off.
    ResetPairing,

    /// Read the soundbar status synchronously.
    RequestStatus,

    /// Reboot the bridge.  Handled by the binary, not the service.
    Restart,
}

impl AppCommand {
    /// Validate a named command for the request/response path (no refresh).
    pub fn send(name: &str) -> Result<Self, CommandError> {
        let cmd = commands::lookup(name).ok_or(CommandError::Unknown)?;
        Ok(Self::Send {
            name: cmd.name,
            refresh: false,
        })
    }

    /// Parse an MQTT message.  `subtopic` is the topic with the base and
    /// its separator already stripped.
    pub fn from_message(
        subtopic: &str,
        payload: &[u8],
        config: &BridgeConfig,
    ) -> Result<Self, CommandError> {
        let text = core::str::from_utf8(payload)
            .map_err(|_| CommandError::Malformed)?
            .trim();

        match subtopic {
            topic::COMMAND => {
                let cmd = commands::lookup(text).ok_or(CommandError::Unknown)?;
                Ok(Self::Send {
                    name: cmd.name,
                    refresh: true,
                })
            }
            topic::SET_VOLUME => parse_level(text, config.volume_max).map(Self::SetVolume),
            topic::SET_SUBWOOFER => {
                parse_level(text, config.subwoofer_max).map(Self::SetSubwoofer)
            }
            topic::RECONNECT => Ok(Self::Reconnect),
            topic::RESTART => Ok(Self::Restart),
            topic::RESET_PAIRING => Ok(Self::ResetPairing),
            _ => Err(CommandError::UnknownTopic),
        }
    }
}

fn parse_level(text: &str, max: u8) -> Result<u8, CommandError> {
    let value: i32 = text.parse().map_err(|_| CommandError::Malformed)?;
    if !(0..=i32::from(max)).contains(&value) {
        return Err(CommandError::OutOfRange {
            value,
            max: i32::from(max),
        });
    }
    u8::try_from(value).map_err(|_| CommandError::Malformed)
}
