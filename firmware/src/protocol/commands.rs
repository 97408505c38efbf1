//! Command table: symbolic name → unframed payload.
//!
//! The table is the single source of truth for both validating external
//! input and producing wire payloads.  It is constant for the process
//! lifetime and every name is unique.

/// One row of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub payload: &'static [u8],
}

// ── Names referenced from code ────────────────────────────────

pub const VOLUME_UP: &str = "volume_up";
pub const VOLUME_DOWN: &str = "volume_down";
pub const SUBWOOFER_UP: &str = "subwoofer_up";
pub const SUBWOOFER_DOWN: &str = "subwoofer_down";
pub const REPORT_STATUS: &str = "report_status";

const fn cmd(name: &'static str, payload: &'static [u8]) -> Command {
    Command { name, payload }
}

/// Every command the soundbar understands.
pub const COMMANDS: &[Command] = &[
    // Power
    cmd("power_toggle", &[0x40, 0x78, 0xcc]),
    cmd("power_on", &[0x40, 0x78, 0x7e]),
    cmd("power_off", &[0x40, 0x78, 0x7f]),
    // Input
    cmd("set_input_hdmi", &[0x40, 0x78, 0x4a]),
    cmd("set_input_analog", &[0x40, 0x78, 0xd1]),
    cmd("set_input_bluetooth", &[0x40, 0x78, 0x29]),
    cmd("set_input_tv", &[0x40, 0x78, 0xdf]),
    // Surround and sound processing
    cmd("set_surround_3d", &[0x40, 0x78, 0xc9]),
    cmd("set_surround_tv", &[0x40, 0x7e, 0xf1]),
    cmd("set_surround_stereo", &[0x40, 0x78, 0x50]),
    cmd("set_surround_movie", &[0x40, 0x78, 0xd9]),
    cmd("set_surround_music", &[0x40, 0x78, 0xda]),
    cmd("set_surround_sports", &[0x40, 0x78, 0xdb]),
    cmd("set_surround_game", &[0x40, 0x78, 0xdc]),
    cmd("surround_toggle", &[0x40, 0x78, 0xb4]),
    cmd("clearvoice_toggle", &[0x40, 0x78, 0x5c]),
    cmd("clearvoice_on", &[0x40, 0x7e, 0x80]),
    cmd("clearvoice_off", &[0x40, 0x7e, 0x82]),
    cmd("bass_ext_toggle", &[0x40, 0x78, 0x8b]),
    cmd("bass_ext_on", &[0x40, 0x78, 0x6e]),
    cmd("bass_ext_off", &[0x40, 0x78, 0x6f]),
    // Volume
    cmd(SUBWOOFER_UP, &[0x40, 0x78, 0x4c]),
    cmd(SUBWOOFER_DOWN, &[0x40, 0x78, 0x4d]),
    cmd("mute_toggle", &[0x40, 0x78, 0x9c]),
    cmd("mute_on", &[0x40, 0x7e, 0xa2]),
    cmd("mute_off", &[0x40, 0x7e, 0xa3]),
    cmd(VOLUME_UP, &[0x40, 0x78, 0x1e]),
    cmd(VOLUME_DOWN, &[0x40, 0x78, 0x1f]),
    // Extra
    cmd("bluetooth_standby_toggle", &[0x40, 0x78, 0x34]),
    cmd("dimmer", &[0x40, 0x78, 0xba]),
    // Status report request
    cmd(REPORT_STATUS, &[0x03, 0x05]),
];

/// Find a command by name.
pub fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Check whether `name` is in the table.
pub fn is_valid(name: &str) -> bool {
    lookup(name).is_some()
}
