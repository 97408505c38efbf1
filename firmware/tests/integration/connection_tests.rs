//! Connection manager and link driver against a scripted radio.

use yas_bridge::config::BridgeConfig;
use yas_bridge::connection::{LinkEdge, LinkPhase, PAIRED_KEY};
use yas_bridge::error::{CommandError, Error, LinkError};
use yas_bridge::link::LinkDriver;
use yas_bridge::protocol::codec;

use crate::mock_link::{config_with_address, status, LinkCall, MockLink, Rig, SOUNDBAR};

// ── Connect routes ────────────────────────────────────────────

#[test]
fn address_route_retries_then_falls_back_to_name() {
    let rig = Rig::new();
    rig.script.borrow_mut().address_default = false;
    let mut conn = rig.manager(&config_with_address());

    conn.connect().expect("name route should succeed");

    assert_eq!(
        rig.calls(),
        vec![
            LinkCall::ConnectAddress(SOUNDBAR),
            LinkCall::ConnectAddress(SOUNDBAR),
            LinkCall::ConnectAddress(SOUNDBAR),
            LinkCall::ConnectName("YAS-209 Yamaha".into()),
        ]
    );
    // Two retry gaps between three address attempts.
    assert!(rig.clock.now() >= 4_000);
    assert_eq!(conn.state().phase, LinkPhase::Connected);
    assert_eq!(conn.state().stats.last_connect_duration_ms, rig.clock.now());
}

#[test]
fn address_route_accepts_third_attempt() {
    let rig = Rig::new();
    rig.script.borrow_mut().address_results = [false, false, true].into();
    let mut conn = rig.manager(&config_with_address());

    conn.connect().unwrap();

    let calls = rig.calls();
    assert_eq!(calls.len(), 3);
    assert!(!calls.iter().any(|c| matches!(c, LinkCall::ConnectName(_))));
}

#[test]
fn name_only_target_skips_address_route() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());

    conn.connect().unwrap();

    assert_eq!(rig.calls(), vec![LinkCall::ConnectName("YAS-209 Yamaha".into())]);
}

#[test]
fn failed_connect_records_attempt_detail() {
    let rig = Rig::new();
    {
        let mut s = rig.script.borrow_mut();
        s.address_default = false;
        s.name_ok = false;
    }
    let mut conn = rig.manager(&config_with_address());

    let err = conn.connect().unwrap_err();

    assert_eq!(err, Error::Link(LinkError::ConnectFailed));
    assert_eq!(conn.state().phase, LinkPhase::ConnectFailed);
    assert_eq!(conn.state().last_error.as_str(), "attempt_1");
    assert_eq!(conn.state().stats.failed_connects, 1);
    assert_eq!(conn.state().stats.successful_connects, 0);
    assert_eq!(rig.store.get(PAIRED_KEY), None);
}

#[test]
fn stale_client_is_torn_down_before_connecting() {
    let rig = Rig::new();
    rig.script.borrow_mut().client = true;
    let mut conn = rig.manager(&BridgeConfig::default());

    conn.connect().unwrap();

    assert_eq!(rig.calls()[0], LinkCall::Disconnect);
    assert!(rig.clock.now() >= 500);
}

#[test]
fn connect_when_already_up_adopts_link() {
    let rig = Rig::new();
    rig.script.borrow_mut().connected = true;
    let mut conn = rig.manager(&BridgeConfig::default());

    conn.connect().unwrap();

    assert!(rig.calls().is_empty());
    assert_eq!(conn.state().phase, LinkPhase::Connected);
    assert_eq!(conn.state().stats.connect_attempts, 0);
}

// ── Pairing flag ──────────────────────────────────────────────

#[test]
fn paired_flag_survives_restart() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    assert!(!conn.state().is_paired);

    conn.connect().unwrap();
    assert_eq!(rig.store.get(PAIRED_KEY), Some(true));

    // A fresh manager on the same store, as after a reboot.
    let again = rig.manager(&BridgeConfig::default());
    assert!(again.state().is_paired);
}

#[test]
fn full_storage_does_not_block_connect_or_reset() {
    let rig = Rig::new();
    rig.store.fill();
    let mut conn = rig.manager(&config_with_address());

    conn.connect().unwrap();
    assert!(conn.is_connected());
    assert!(conn.state().is_paired);
    assert_eq!(rig.store.get(PAIRED_KEY), None);

    conn.reset_pairing();
    assert_eq!(conn.state().phase, LinkPhase::PairingReset);
    assert!(!conn.state().is_paired);
    assert!(rig.calls().contains(&LinkCall::RemoveBond(SOUNDBAR)));
}

// ── Reconnect gating ──────────────────────────────────────────

#[test]
fn backoff_gates_automatic_reconnect() {
    let rig = Rig::new();
    rig.script.borrow_mut().name_ok = false;
    let mut conn = rig.manager(&BridgeConfig::default());

    assert!(conn.connect().is_err());
    let failed_at = rig.clock.now();

    rig.clock.advance(9_999);
    assert!(conn.poll_reconnect().is_none());

    rig.script.borrow_mut().name_ok = true;
    rig.clock.advance(1);
    assert!(conn.reconnect_due(failed_at + 10_000));
    assert!(matches!(conn.poll_reconnect(), Some(Ok(()))));
}

#[test]
fn reset_pairing_holds_off_reconnect() {
    let rig = Rig::new();
    let mut conn = rig.manager(&config_with_address());
    conn.connect().unwrap();
    let reset_at = rig.clock.now();

    conn.reset_pairing();

    assert_eq!(conn.state().phase, LinkPhase::PairingReset);
    assert!(!conn.state().is_paired);
    assert_eq!(rig.store.get(PAIRED_KEY), Some(false));
    assert!(rig.calls().contains(&LinkCall::RemoveBond(SOUNDBAR)));
    assert!(!conn.is_connected());
    assert_eq!(conn.state().stats.disconnects, 1);

    rig.clock.advance(29_999);
    assert!(!conn.reconnect_due(rig.clock.now()));
    assert!(conn.poll_reconnect().is_none());

    rig.clock.advance(1);
    assert_eq!(rig.clock.now(), reset_at + 30_000);
    assert!(matches!(conn.poll_reconnect(), Some(Ok(()))));
}

#[test]
fn manual_reconnect_bypasses_hold_off() {
    let rig = Rig::new();
    let mut conn = rig.manager(&config_with_address());
    conn.connect().unwrap();
    conn.reset_pairing();

    conn.connect_now().unwrap();

    assert_eq!(conn.state().phase, LinkPhase::Connected);
    assert_eq!(conn.state().hold_off_until_ms, 0);
}

#[test]
fn bond_removal_falls_back_to_peer_address() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();

    conn.reset_pairing();

    assert!(rig.calls().contains(&LinkCall::RemoveBond(SOUNDBAR)));
}

// ── Edge detection ────────────────────────────────────────────

#[test]
fn link_loss_is_reported_once() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();
    rig.clock.advance(5_000);

    rig.drop_link();

    assert_eq!(conn.tick(), Some(LinkEdge::Down { connected_for_ms: 5_000 }));
    assert_eq!(conn.tick(), None);
    assert_eq!(conn.state().phase, LinkPhase::Disconnected);
    assert_eq!(conn.state().stats.disconnects, 1);
    assert_eq!(conn.state().stats.total_connected_ms, 5_000);
}

#[test]
fn radio_link_up_is_adopted() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());

    rig.script.borrow_mut().connected = true;

    assert_eq!(conn.tick(), Some(LinkEdge::Up));
    assert_eq!(conn.state().phase, LinkPhase::Connected);
    assert_eq!(conn.state().connected_since_ms, Some(rig.clock.now()));
    assert_eq!(conn.tick(), None);
}

// ── Requests ──────────────────────────────────────────────────

#[test]
fn unknown_command_is_rejected_before_io() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());

    assert_eq!(
        conn.send_command("warp_drive"),
        Err(Error::Command(CommandError::Unknown))
    );
    assert_eq!(
        conn.send_command("power_on"),
        Err(Error::Link(LinkError::NotConnected))
    );
    assert!(rig.script.borrow().writes.is_empty());
}

#[test]
fn short_write_is_reported() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();
    rig.script.borrow_mut().writes_left = Some(0);

    let err = conn.send_command("volume_up").unwrap_err();

    assert_eq!(
        err,
        Error::Link(LinkError::ShortWrite {
            written: 0,
            expected: 7,
        })
    );
    assert_eq!(conn.state().last_error.as_str(), "write_failed_volume_up");
}

#[test]
fn request_status_counts_bytes() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();

    let record = conn.request_status().unwrap();

    assert_eq!(record, status(15, 16));
    let stats = conn.state().stats;
    assert_eq!(stats.bytes_sent, 6);
    assert_eq!(stats.bytes_received, codec::status_frame(&record).len() as u64);
}

#[test]
fn silent_soundbar_times_out() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();
    rig.set_status(None);
    let before = rig.clock.now();

    assert_eq!(conn.request_status(), Err(Error::Link(LinkError::NoResponse)));
    assert!(rig.clock.now() - before >= 3_000);
}

#[test]
fn non_status_response_is_a_decode_error() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();
    rig.set_status(None);
    let now = rig.clock.now();
    rig.queue_rx(now + 5, &[0xCC, 0xAA, 0x02, 0x01, 0x00, 0xFD]);

    assert_eq!(conn.request_status(), Err(Error::Decode));
    assert_eq!(conn.state().stats.bytes_received, 6);
}

#[test]
fn stale_input_is_flushed_before_request() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();
    let now = rig.clock.now();
    rig.queue_rx(now, &[0x00, 0x11, 0x22]);

    let record = conn.request_status().unwrap();

    assert_eq!(record.volume, 15);
}

#[test]
fn strict_checksum_rejects_bad_frame() {
    let rig = Rig::new();
    let config = BridgeConfig {
        verify_status_checksum: true,
        ..BridgeConfig::default()
    };
    let mut conn = rig.manager(&config);
    conn.connect().unwrap();
    rig.set_status(None);

    let mut frame = codec::status_frame(&status(20, 8));
    let last = frame.len() - 1;
    frame[last] = frame[last].wrapping_add(1);
    // Arrives after the request goes out, so the pre-request flush keeps it.
    let now = rig.clock.now();
    rig.queue_rx(now + 5, &frame);

    assert_eq!(conn.request_status(), Err(Error::Decode));
    assert_eq!(conn.state().stats.bytes_received, frame.len() as u64);
}

#[test]
fn strict_checksum_rejects_frame_without_trailer() {
    let rig = Rig::new();
    let config = BridgeConfig {
        verify_status_checksum: true,
        ..BridgeConfig::default()
    };
    let mut conn = rig.manager(&config);
    conn.connect().unwrap();
    rig.set_status(None);

    let frame = codec::status_frame(&status(20, 8));
    let now = rig.clock.now();
    rig.queue_rx(now + 5, &frame[..codec::STATUS_MIN_LEN]);

    assert_eq!(conn.request_status(), Err(Error::Decode));
}

#[test]
fn permissive_mode_accepts_frame_without_trailer() {
    let rig = Rig::new();
    let mut conn = rig.manager(&BridgeConfig::default());
    conn.connect().unwrap();
    rig.set_status(None);

    let frame = codec::status_frame(&status(20, 8));
    let now = rig.clock.now();
    rig.queue_rx(now + 5, &frame[..codec::STATUS_MIN_LEN]);

    let record = conn.request_status().unwrap();
    assert_eq!(record.volume, 20);
    assert_eq!(record.subwoofer, 8);
}

// ── Response framing ──────────────────────────────────────────

#[test]
fn read_frame_ends_after_inter_byte_gap() {
    let rig = Rig::new();
    rig.script.borrow_mut().connected = true;
    let link = MockLink::new(rig.script.clone(), rig.clock.clone());
    let mut driver = LinkDriver::new(link, rig.clock.clone(), &BridgeConfig::default());

    rig.queue_rx(5, &[0xCC, 0xAA]);
    rig.queue_rx(20, &[0x0D]);
    rig.queue_rx(500, &[0xFF]);

    let frame = driver.read_frame(3_000, 100);

    assert_eq!(frame.as_slice(), &[0xCC, 0xAA, 0x0D]);
    assert!(rig.clock.now() >= 120 && rig.clock.now() < 500);
    // The late byte is left for the next read.
    rig.clock.advance(500);
    assert_eq!(driver.flush_input(), 1);
}

#[test]
fn read_frame_gives_up_at_overall_timeout() {
    let rig = Rig::new();
    let link = MockLink::new(rig.script.clone(), rig.clock.clone());
    let mut driver = LinkDriver::new(link, rig.clock.clone(), &BridgeConfig::default());

    let frame = driver.read_frame(250, 100);

    assert!(frame.is_empty());
    assert_eq!(rig.clock.now(), 250);
}
