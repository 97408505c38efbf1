//! Command framing and status decoding.
//!
//! Outbound: `CC AA <len> <payload> <checksum>` where the checksum is the
//! two's-complement negation of `len + Σ payload`, so the low byte of
//! `len + Σ payload + checksum` is always zero.
//!
//! Inbound status report (17 bytes as observed, 16 required):
//! ```text
//!  0  1  2  3  4  5     6     7     8      9    10 11 12 13 14    15
//!  CC AA 0D 05 00 power input muted volume sub  20 20 00 surround flags ...
//! ```
//! The inbound checksum is not checked by [`decode`]; callers that want
//! it use [`status_checksum_ok`].

use core::fmt;

use super::commands;
use super::status::{InputSource, StatusRecord, SurroundMode};

/// Frame preamble.
pub const MAGIC: [u8; 2] = [0xCC, 0xAA];

/// Largest frame the encoder will produce.
pub const MAX_FRAME_LEN: usize = 20;

/// Minimum length of a status report.
pub const STATUS_MIN_LEN: usize = 16;

/// Message-type code for a status report.
pub const STATUS_REPORT_TYPE: u8 = 0x05;

// ── Status frame offsets ──────────────────────────────────────

const OFFSET_LENGTH: usize = 2;
const OFFSET_TYPE: usize = 3;
const OFFSET_POWER: usize = 5;
const OFFSET_INPUT: usize = 6;
const OFFSET_MUTED: usize = 7;
const OFFSET_VOLUME: usize = 8;
const OFFSET_SUBWOOFER: usize = 9;
const OFFSET_SURROUND: usize = 13;
const OFFSET_FLAGS: usize = 15;

const BASS_EXT_NIBBLE: u8 = 0x2;
const CLEAR_VOICE_NIBBLE: u8 = 0x4;

/// A framed command, fixed capacity (no heap).
pub type Frame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// `(-(len + Σ payload)) & 0xFF`.
pub fn checksum(len: u8, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(len, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Frame a raw payload.  `None` if it would not fit in [`MAX_FRAME_LEN`].
pub fn encode_payload(payload: &[u8]) -> Option<Frame> {
    let len = u8::try_from(payload.len()).ok()?;
    let mut frame = Frame::new();
    frame.extend_from_slice(&MAGIC).ok()?;
    frame.push(len).ok()?;
    frame.extend_from_slice(payload).ok()?;
    frame.push(checksum(len, payload)).ok()?;
    Some(frame)
}

/// Frame the command called `name`.  `None` when the name is not in the table.
pub fn encode(name: &str) -> Option<Frame> {
    commands::lookup(name).and_then(|c| encode_payload(c.payload))
}

/// Whether `bytes` carries the status-report type code.
pub fn is_status_frame(bytes: &[u8]) -> bool {
    bytes.len() >= STATUS_MIN_LEN && bytes.get(OFFSET_TYPE) == Some(&STATUS_REPORT_TYPE)
}

/// Verify the checksum trailing an inbound frame.
///
/// Returns `false` when the frame is shorter than its length byte claims,
/// trailer included.  A status report cut at [`STATUS_MIN_LEN`] still
/// decodes, but has no checksum byte to verify and is rejected here.
pub fn status_checksum_ok(bytes: &[u8]) -> bool {
    let Some(&len) = bytes.get(OFFSET_LENGTH) else {
        return false;
    };
    let start = OFFSET_LENGTH + 1;
    let end = start + len as usize;
    match (bytes.get(start..end), bytes.get(end)) {
        (Some(payload), Some(&ck)) => checksum(len, payload) == ck,
        _ => false,
    }
}

/// Decode a status report.  Never fails: anything that is not a status
/// frame yields [`StatusRecord::UNKNOWN`] (`valid == false`).
pub fn decode(bytes: &[u8]) -> StatusRecord {
    if !is_status_frame(bytes) {
        return StatusRecord::UNKNOWN;
    }

    let byte = |offset: usize| bytes.get(offset).copied().unwrap_or(0);
    let surround = u16::from_be_bytes([byte(OFFSET_SURROUND), byte(OFFSET_SURROUND + 1)]);
    let flags = byte(OFFSET_FLAGS);

    StatusRecord {
        power: byte(OFFSET_POWER) == 0x01,
        input: InputSource::from_code(byte(OFFSET_INPUT)),
        muted: byte(OFFSET_MUTED) == 0x01,
        volume: byte(OFFSET_VOLUME),
        subwoofer: byte(OFFSET_SUBWOOFER),
        surround: SurroundMode::from_code(surround),
        bass_ext: flags >> 4 == BASS_EXT_NIBBLE,
        clear_voice: flags & 0x0f == CLEAR_VOICE_NIBBLE,
        valid: true,
    }
}

/// Build the frame the soundbar sends for `record`.
///
/// Device-side encoding, used by the host simulator and by tests.
pub fn status_frame(record: &StatusRecord) -> Frame {
    let surround = record.surround.code().unwrap_or(0xffff).to_be_bytes();
    let mut flags = 0u8;
    if record.bass_ext {
        flags |= BASS_EXT_NIBBLE << 4;
    }
    if record.clear_voice {
        flags |= CLEAR_VOICE_NIBBLE;
    }
    let body = [
        STATUS_REPORT_TYPE,
        0x00,
        u8::from(record.power),
        record.input.code().unwrap_or(0xff),
        u8::from(record.muted),
        record.volume,
        record.subwoofer,
        0x20,
        0x20,
        0x00,
        surround[0],
        surround[1],
        flags,
    ];
    // 13-byte body always fits.
    encode_payload(&body).unwrap_or_default()
}

/// Space-separated upper-case hex, for log lines.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}
