//! BridgeService end to end: commands in, events out.

use yas_bridge::adapters::log_sink::{LogEventSink, Tee};
use yas_bridge::adapters::mqtt::{Inbox, MqttEvent, MqttSink, Topics};
use yas_bridge::adapters::spp::SppLink;
use yas_bridge::app::commands::AppCommand;
use yas_bridge::app::events::AppEvent;
use yas_bridge::app::service::{BridgeService, CommandOutcome};
use yas_bridge::config::BridgeConfig;
use yas_bridge::connection::{ConnectionManager, LinkPhase};
use yas_bridge::error::{CommandError, Error, LinkError};
use yas_bridge::link::LinkDriver;
use yas_bridge::protocol::commands::REPORT_STATUS;

use crate::mock_link::{status, FakeClock, MockStore, RecordingSink, Rig, TestService};

fn started() -> (Rig, TestService, RecordingSink) {
    let rig = Rig::new();
    let mut svc = rig.service(&BridgeConfig::default());
    let mut sink = RecordingSink::new();
    svc.start(&mut sink);
    rig.clear_writes();
    (rig, svc, sink)
}

fn message(subtopic: &str, payload: &str) -> Result<AppCommand, CommandError> {
    AppCommand::from_message(subtopic, payload.as_bytes(), &BridgeConfig::default())
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn start_announces_link_and_status() {
    let (_rig, svc, sink) = started();

    assert_eq!(
        sink.events,
        vec![
            AppEvent::Started,
            AppEvent::LinkStatus("disconnected"),
            AppEvent::Availability(true),
            AppEvent::LinkStatus("connected"),
            AppEvent::StatusChanged(status(15, 16)),
        ]
    );
    assert_eq!(*svc.last_status(), status(15, 16));
}

#[test]
fn failed_start_reports_offline() {
    let rig = Rig::new();
    rig.script.borrow_mut().name_ok = false;
    let mut svc = rig.service(&BridgeConfig::default());
    let mut sink = RecordingSink::new();

    svc.start(&mut sink);

    assert_eq!(sink.availability(), vec![false]);
    assert_eq!(sink.link_statuses(), vec!["disconnected", "connect_failed"]);
    assert!(sink.statuses().is_empty());
}

// ── Tick ──────────────────────────────────────────────────────

#[test]
fn link_status_is_published_only_on_change() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    for _ in 0..3 {
        rig.clock.advance(2_000);
        svc.tick(&mut sink);
    }

    assert!(sink.link_statuses().is_empty());
}

#[test]
fn link_loss_and_recovery_flip_availability() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    rig.drop_link();
    svc.tick(&mut sink);
    assert_eq!(sink.availability(), vec![false]);
    assert_eq!(sink.link_statuses(), vec!["disconnected"]);

    // Still inside the reconnect backoff.
    rig.clock.advance(1_000);
    svc.tick(&mut sink);
    assert_eq!(sink.availability(), vec![false]);

    rig.clock.advance(10_000);
    svc.tick(&mut sink);
    assert_eq!(sink.availability(), vec![false, true]);
    assert_eq!(sink.link_statuses(), vec!["disconnected", "connected"]);
    assert_eq!(svc.connection().state().stats.disconnects, 1);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn subscribed_command_refreshes_status() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    let cmd = message("command", "power_off").unwrap();
    assert_eq!(svc.handle_command(cmd, &mut sink), Ok(CommandOutcome::Sent));

    assert_eq!(rig.sent(), vec!["power_off", REPORT_STATUS]);
    let gap = rig.sent_at(REPORT_STATUS)[0] - rig.sent_at("power_off")[0];
    assert!(gap >= 100);
    assert_eq!(sink.statuses(), vec![status(15, 16)]);
}

#[test]
fn request_path_sends_without_refresh() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    let cmd = AppCommand::send("mute_toggle").unwrap();
    svc.handle_command(cmd, &mut sink).unwrap();

    assert_eq!(rig.sent(), vec!["mute_toggle"]);
    assert!(sink.events.is_empty());
}

#[test]
fn set_volume_converges() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    let outcome = svc.handle_command(message("set_volume", "18").unwrap(), &mut sink);

    let Ok(CommandOutcome::Converged(report)) = outcome else {
        panic!("expected convergence, got {outcome:?}");
    };
    assert_eq!(report.sent, 3);
    assert_eq!(rig.sent_at("volume_up").len(), 3);
    assert_eq!(svc.last_status().volume, 18);
    assert_eq!(sink.statuses().last().map(|s| s.volume), Some(18));
}

#[test]
fn out_of_range_values_never_reach_the_link() {
    let (rig, _svc, _sink) = started();

    assert_eq!(
        message("set_volume", "51"),
        Err(CommandError::OutOfRange { value: 51, max: 50 })
    );
    assert_eq!(
        message("set_subwoofer", "-1"),
        Err(CommandError::OutOfRange { value: -1, max: 32 })
    );
    assert_eq!(message("command", "self_destruct"), Err(CommandError::Unknown));
    assert!(rig.sent().is_empty());
}

#[test]
fn commands_fail_fast_when_disconnected() {
    let rig = Rig::new();
    rig.script.borrow_mut().name_ok = false;
    let mut svc = rig.service(&BridgeConfig::default());
    let mut sink = RecordingSink::new();
    svc.start(&mut sink);

    let err = svc
        .handle_command(AppCommand::send("power_on").unwrap(), &mut sink)
        .unwrap_err();

    assert_eq!(err, Error::Link(LinkError::NotConnected));
    assert_eq!(svc.connection().state().phase, LinkPhase::ConnectFailed);
}

#[test]
fn request_status_publishes_only_changes() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    let out = svc.handle_command(AppCommand::RequestStatus, &mut sink);
    assert_eq!(out, Ok(CommandOutcome::Status(status(15, 16))));
    assert!(sink.statuses().is_empty());

    rig.set_status(Some(status(15, 20)));
    svc.handle_command(AppCommand::RequestStatus, &mut sink).unwrap();
    assert_eq!(sink.statuses(), vec![status(15, 20)]);
}

#[test]
fn reset_pairing_then_manual_reconnect() {
    let (rig, mut svc, mut sink) = started();
    sink.clear();

    let out = svc.handle_command(message("reset_pairing", "").unwrap(), &mut sink);
    assert_eq!(out, Ok(CommandOutcome::PairingReset));
    assert_eq!(sink.availability(), vec![false]);
    assert_eq!(sink.link_statuses(), vec!["pairing_reset"]);

    // Automatic reconnect stays held off.
    rig.clock.advance(15_000);
    svc.tick(&mut sink);
    assert!(!svc.connection().is_connected());

    let out = svc.handle_command(message("reconnect", "").unwrap(), &mut sink);
    assert_eq!(out, Ok(CommandOutcome::Connected));
    assert_eq!(sink.availability(), vec![false, true]);
    assert_eq!(sink.link_statuses(), vec!["pairing_reset", "connected"]);
    assert_eq!(sink.statuses().len(), 1);
}

#[test]
fn restart_is_left_to_the_caller() {
    let (rig, mut svc, mut sink) = started();

    let out = svc.handle_command(message("restart", "1").unwrap(), &mut sink);

    assert_eq!(out, Ok(CommandOutcome::RestartRequested));
    assert!(rig.sent().is_empty());
}

// ── Telemetry resync ──────────────────────────────────────────

#[test]
fn resync_republishes_everything() {
    let (_rig, mut svc, mut sink) = started();
    sink.clear();

    svc.resync(&mut sink);

    assert_eq!(
        sink.events,
        vec![
            AppEvent::Availability(true),
            AppEvent::LinkStatus("connected"),
            AppEvent::StatusChanged(status(15, 16)),
        ]
    );
}

#[test]
fn resync_while_down_replays_last_known() {
    let (rig, mut svc, mut sink) = started();
    rig.drop_link();
    svc.tick(&mut sink);
    sink.clear();

    svc.resync(&mut sink);

    assert_eq!(
        sink.events,
        vec![
            AppEvent::Availability(false),
            AppEvent::LinkStatus("disconnected"),
            AppEvent::StatusChanged(status(15, 16)),
        ]
    );
}

// ── Chip temperature ──────────────────────────────────────────

#[test]
fn temperature_publishes_past_threshold_and_on_resync() {
    let (_rig, mut svc, mut sink) = started();
    sink.clear();

    assert!(svc.observe_temperature(45.0, &mut sink));
    assert!(!svc.observe_temperature(45.4, &mut sink));
    assert!(svc.observe_temperature(45.6, &mut sink));
    assert_eq!(
        sink.events,
        vec![AppEvent::ChipTemperature(45.0), AppEvent::ChipTemperature(45.6)]
    );
    assert_eq!(svc.diagnostics().chip_temp_c, Some(45.6));

    sink.clear();
    svc.resync(&mut sink);
    assert_eq!(sink.events.last(), Some(&AppEvent::ChipTemperature(45.6)));
}

// ── Diagnostics ───────────────────────────────────────────────

#[test]
fn diagnostics_reflect_link_history() {
    let (rig, svc, _sink) = started();
    rig.clock.advance(1_000);

    let report = svc.diagnostics();

    assert!(report.connected);
    assert!(report.paired);
    assert_eq!(report.status, "connected");
    assert_eq!(report.connection_attempts, 1);
    assert_eq!(report.successful_connections, 1);
    assert_eq!(report.success_rate, Some(100.0));
    assert!(report.total_connected_time_ms >= 1_000);

    let json = report.to_json().unwrap();
    assert!(json.contains(r#""status":"connected""#));
    assert!(!json.contains("last_error"));
    assert_eq!(report.chip_temp_c, None);
}

// ── Simulated radio + MQTT ────────────────────────────────────

#[test]
fn simulated_bridge_publishes_over_mqtt() {
    let config = BridgeConfig::default();
    let clock = FakeClock::new();
    let driver = LinkDriver::new(SppLink::from_config(&config), clock.clone(), &config);
    let conn = ConnectionManager::new(driver, MockStore::new(), &config);
    let mut svc = BridgeService::new(conn, &config);

    let mut log = LogEventSink::new();
    let mut mqtt = MqttSink::simulated(Topics::new(&config.mqtt_base_topic));
    svc.start(&mut Tee(&mut log, &mut mqtt));

    // Inbound messages arrive through the bounded inbox, as on the device.
    let inbox = Inbox::new();
    let topic = mqtt.topics().full("set_volume");
    assert!(inbox.forward(MqttEvent::message(&topic, b"20").unwrap()));
    while let Some(MqttEvent::Message { topic, payload }) = inbox.next() {
        let sub = mqtt.topics().strip(&topic).unwrap();
        let cmd = AppCommand::from_message(sub, &payload, &config).unwrap();
        svc.handle_command(cmd, &mut Tee(&mut log, &mut mqtt)).unwrap();
    }

    let published = mqtt.published();
    assert!(published.iter().all(|m| m.retain));
    assert!(published.iter().any(|m| {
        m.topic == "homeassistant/soundbar/available" && m.payload == "online"
    }));
    assert!(published.iter().any(|m| {
        m.topic == "homeassistant/soundbar/bt_status" && m.payload == "connected"
    }));
    let last_state = published
        .iter()
        .rev()
        .find(|m| m.topic == "homeassistant/soundbar/state")
        .unwrap();
    assert!(last_state.payload.contains(r#""volume":20"#));
    assert!(last_state.payload.contains(r#""power":"ON""#));
}
