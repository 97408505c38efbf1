//! Unified error types for the bridge firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! scheduler loop's error handling uniform.  All variants are `Copy` so they
//! pass through the connection manager and the convergence controller
//! without allocation.

use core::fmt;

use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An inbound control request was rejected before any I/O.
    Command(CommandError),
    /// The Bluetooth link refused, dropped, or short-wrote.
    Link(LinkError),
    /// A response arrived but is not a status report.
    Decode,
    /// Persistent storage failed.
    Storage(StorageError),
    /// Peripheral initialisation failed (fatal, restart is the only recovery).
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Decode => write!(f, "failed to decode status response"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Name is not in the command table.
    Unknown,
    /// Topic has no handler.
    UnknownTopic,
    /// Payload is not a number.
    Malformed,
    /// Numeric set-value request outside the control's range.
    OutOfRange { value: i32, max: i32 },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown command"),
            Self::UnknownTopic => write!(f, "no handler for topic"),
            Self::Malformed => write!(f, "payload is not an integer"),
            Self::OutOfRange { value, max } => write!(f, "value {value} outside 0..={max}"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The SPP link is down; requests fail fast instead of waiting out the timeout.
    NotConnected,
    /// Every address attempt and the name fallback failed.
    ConnectFailed,
    /// The link accepted fewer bytes than requested.
    ShortWrite { written: usize, expected: usize },
    /// No byte arrived before the response timeout.
    NoResponse,
    /// The Bluetooth stack refused to drop the bond (ESP-IDF error code).
    BondRemoval(i32),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Bluetooth not connected"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::ShortWrite { written, expected } => {
                write!(f, "write failed, sent {written} of {expected} bytes")
            }
            Self::NoResponse => write!(f, "no response"),
            Self::BondRemoval(code) => write!(f, "bond removal failed ({code})"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
