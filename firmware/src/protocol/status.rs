//! Decoded soundbar status.

use serde::Serialize;

/// Selected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Hdmi,
    Analog,
    Bluetooth,
    Tv,
    Unknown,
}

impl InputSource {
    /// Map the wire code at the input offset.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Hdmi,
            0x0c => Self::Analog,
            0x05 => Self::Bluetooth,
            0x07 => Self::Tv,
            _ => Self::Unknown,
        }
    }

    /// Wire code, `None` for [`Unknown`](Self::Unknown).
    pub fn code(self) -> Option<u8> {
        match self {
            Self::Hdmi => Some(0x00),
            Self::Analog => Some(0x0c),
            Self::Bluetooth => Some(0x05),
            Self::Tv => Some(0x07),
            Self::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hdmi => "hdmi",
            Self::Analog => "analog",
            Self::Bluetooth => "bluetooth",
            Self::Tv => "tv",
            Self::Unknown => "unknown",
        }
    }
}

/// Surround program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SurroundMode {
    #[serde(rename = "3d")]
    ThreeD,
    Tv,
    Stereo,
    Movie,
    Music,
    Sports,
    Game,
    Unknown,
}

impl SurroundMode {
    /// Map the big-endian 2-byte wire code at the surround offset.
    pub fn from_code(code: u16) -> Self {
        match code {
            0x000d => Self::ThreeD,
            0x000a => Self::Tv,
            0x0100 => Self::Stereo,
            0x0003 => Self::Movie,
            0x0008 => Self::Music,
            0x0009 => Self::Sports,
            0x000c => Self::Game,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> Option<u16> {
        match self {
            Self::ThreeD => Some(0x000d),
            Self::Tv => Some(0x000a),
            Self::Stereo => Some(0x0100),
            Self::Movie => Some(0x0003),
            Self::Music => Some(0x0008),
            Self::Sports => Some(0x0009),
            Self::Game => Some(0x000c),
            Self::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreeD => "3d",
            Self::Tv => "tv",
            Self::Stereo => "stereo",
            Self::Movie => "movie",
            Self::Music => "music",
            Self::Sports => "sports",
            Self::Game => "game",
            Self::Unknown => "unknown",
        }
    }
}

/// One decoded status report.
///
/// `valid == false` is the "could not decode" sentinel: every other field
/// then holds its default and must not be read as a real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub power: bool,
    pub input: InputSource,
    pub muted: bool,
    pub volume: u8,
    pub subwoofer: u8,
    pub surround: SurroundMode,
    pub bass_ext: bool,
    pub clear_voice: bool,
    #[serde(skip)]
    pub valid: bool,
}

impl StatusRecord {
    /// The "unknown" default and decode-failure sentinel.
    pub const UNKNOWN: Self = Self {
        power: false,
        input: InputSource::Unknown,
        muted: false,
        volume: 0,
        subwoofer: 0,
        surround: SurroundMode::Unknown,
        bass_ext: false,
        clear_voice: false,
        valid: false,
    };

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self::UNKNOWN
    }
}
