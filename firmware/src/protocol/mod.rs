//! YAS soundbar serial protocol: pure functions, no I/O, no state.
//!
//! Wire format (raw bytes over SPP):
//! ```text
//! ┌───────────┬────────────┬──────────────────┬──────────────┐
//! │ Magic (2B)│ Length (1B)│ Payload (N B)    │ Checksum (1B)│
//! │ CC AA     │ N          │ from the table   │ -(N + Σ) & FF│
//! └───────────┴────────────┴──────────────────┴──────────────┘
//! ```
//!
//! Commands are framed from the static [`commands::COMMANDS`] table.
//! The device answers `report_status` with a fixed-layout frame decoded
//! by [`codec::decode`] into a [`status::StatusRecord`].

pub mod codec;
pub mod commands;
pub mod status;
