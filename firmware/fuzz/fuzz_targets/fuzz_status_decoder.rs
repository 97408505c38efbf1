//! Fuzz target: `codec::decode` and `codec::status_checksum_ok`
//!
//! Feeds arbitrary responses into the status decoder and asserts that it
//! never panics, that anything not shaped like a status report decodes to
//! the sentinel, and that a valid record re-frames with a good checksum.
//!
//! cargo fuzz run fuzz_status_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use yas_bridge::protocol::codec;
use yas_bridge::protocol::status::StatusRecord;

fuzz_target!(|data: &[u8]| {
    let record = codec::decode(data);
    let _ = codec::status_checksum_ok(data);

    if !codec::is_status_frame(data) {
        assert_eq!(record, StatusRecord::UNKNOWN, "non-status input must decode to the sentinel");
        return;
    }

    assert!(record.valid);
    let frame = codec::status_frame(&record);
    assert!(codec::status_checksum_ok(&frame), "re-framed status has a bad checksum");

    let again = codec::decode(&frame);
    assert_eq!(again.volume, record.volume);
    assert_eq!(again.subwoofer, record.subwoofer);
    assert_eq!(again.power, record.power);
    assert_eq!(again.muted, record.muted);
});
