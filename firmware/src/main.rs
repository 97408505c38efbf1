//! YAS Bridge Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single-threaded scheduler loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SppLink        Esp32Time     NvsAdapter      LogEventSink     │
//! │  (SerialLink)   (TimePort)    (Persistence)   (EventSink)      │
//! │  WifiAdapter    MqttSink ── mqtt-rx thread ──▶ INBOX (bounded) │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              BridgeService (pure logic)                │    │
//! │  │  ConnectionManager · StatusPoller · Convergence        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use yas_bridge::adapters::log_sink::{LogEventSink, Tee};
use yas_bridge::adapters::mqtt::{BrokerSettings, INBOX, MqttEvent, MqttSink, Topics};
use yas_bridge::adapters::nvs::NvsAdapter;
use yas_bridge::adapters::spp::SppLink;
use yas_bridge::adapters::thermal::ChipThermometer;
use yas_bridge::adapters::time::Esp32TimeAdapter;
use yas_bridge::adapters::wifi::{ConnectivityPort, WifiAdapter};
use yas_bridge::app::commands::AppCommand;
use yas_bridge::app::ports::{ThermalPort, TimePort};
use yas_bridge::app::service::{BridgeService, CommandOutcome};
use yas_bridge::config::{self, BridgeConfig};
use yas_bridge::connection::ConnectionManager;
use yas_bridge::link::LinkDriver;
use yas_bridge::poller::PollOutcome;

/// Scheduler loop period.
const LOOP_PERIOD_MS: u32 = 10;

/// How often the diagnostics document is logged.
const DIAGNOSTICS_EVERY_MS: u64 = 60_000;

// ── Build-time secrets ────────────────────────────────────────

const WIFI_SSID: &str = env!("WIFI_SSID");
const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");
const MQTT_URL: &str = env!("MQTT_URL");
const MQTT_USER: Option<&str> = option_env!("MQTT_USER");
const MQTT_PASSWORD: Option<&str> = option_env!("MQTT_PASSWORD");
const SOUNDBAR_ADDR: Option<&str> = option_env!("SOUNDBAR_ADDR");

fn load_config() -> Result<BridgeConfig> {
    let mut config = BridgeConfig::default();
    if let Some(addr) = SOUNDBAR_ADDR {
        match addr.parse() {
            Ok(a) => config.soundbar_address = Some(a),
            Err(_) => warn!("Config: ignoring malformed SOUNDBAR_ADDR '{addr}'"),
        }
    }
    if let Some(name) = option_env!("SOUNDBAR_NAME") {
        config.soundbar_name = config::fixed(name);
    }
    config.validate()?;
    Ok(config)
}

fn restart() -> ! {
    warn!("Restarting");
    // SAFETY: esp_restart never returns.
    unsafe { esp_idf_svc::sys::esp_restart() }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  YAS Bridge v{}                   ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = load_config()?;

    // ── 2. Persistent storage ─────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            error!("NVS init failed ({e}), halting for restart");
            restart();
        }
    };

    // ── 3. Radios ─────────────────────────────────────────────
    let (wifi_modem, bt_modem) = peripherals.modem.split();

    let esp_wifi = EspWifi::new(wifi_modem, sys_loop.clone(), Some(nvs_partition.clone()))?;
    let mut wifi = WifiAdapter::new(BlockingWifi::wrap(esp_wifi, sys_loop)?, config.wifi_retry_ms);
    wifi.set_credentials(WIFI_SSID, WIFI_PASSWORD)?;
    let clock = Esp32TimeAdapter::new();
    if let Err(e) = wifi.connect(clock.now_ms()) {
        warn!("WiFi: initial connect failed ({e}), will retry");
    }

    let link = match SppLink::new(bt_modem, nvs_partition, &config) {
        Ok(l) => l,
        Err(e) => {
            error!("BT: {e}");
            restart();
        }
    };

    // ── 4. Telemetry ──────────────────────────────────────────
    let topics = Topics::new(&config.mqtt_base_topic);
    let settings = BrokerSettings {
        url: MQTT_URL,
        client_id: &config.device_name,
        username: MQTT_USER,
        password: MQTT_PASSWORD,
    };
    let mut mqtt = MqttSink::connect(&settings, topics)?;
    let mut log_sink = LogEventSink::new();
    let mut thermometer = ChipThermometer::new();

    // ── 5. Bridge service ─────────────────────────────────────
    let driver = LinkDriver::new(link, clock, &config);
    let conn = ConnectionManager::new(driver, nvs, &config);
    let mut service = BridgeService::new(conn, &config);
    service.start(&mut Tee(&mut log_sink, &mut mqtt));

    info!("System ready. Entering scheduler loop.");

    // ── 6. Scheduler loop ─────────────────────────────────────
    let mut last_diagnostics_ms = 0;
    loop {
        let now = service.connection().now_ms();
        wifi.poll(now);

        while let Some(event) = INBOX.next() {
            match event {
                MqttEvent::Connected => {
                    info!("MQTT: connected");
                    mqtt.subscribe_all();
                    service.resync(&mut Tee(&mut log_sink, &mut mqtt));
                }
                MqttEvent::Disconnected => warn!("MQTT: disconnected"),
                MqttEvent::Message { topic, payload } => {
                    let Some(subtopic) = mqtt.topics().strip(&topic) else {
                        continue;
                    };
                    let cmd = match AppCommand::from_message(subtopic, &payload, &config) {
                        Ok(c) => c,
                        Err(e) => {
                            warn!("MQTT: rejected {topic}: {e}");
                            continue;
                        }
                    };
                    let outcome = service.handle_command(cmd, &mut Tee(&mut log_sink, &mut mqtt));
                    if let Ok(CommandOutcome::RestartRequested) = outcome {
                        restart();
                    }
                }
            }
        }

        let outcome = service.tick(&mut Tee(&mut log_sink, &mut mqtt));
        if outcome != PollOutcome::Skipped {
            if let Some(celsius) = thermometer.read_celsius() {
                service.observe_temperature(celsius, &mut Tee(&mut log_sink, &mut mqtt));
            }
        }

        if now.saturating_sub(last_diagnostics_ms) >= DIAGNOSTICS_EVERY_MS {
            last_diagnostics_ms = now;
            let report = service.diagnostics().with_wifi_rssi(wifi.rssi());
            match report.to_json() {
                Ok(json) => info!("DIAG | {json}"),
                Err(e) => warn!("DIAG | serialisation failed: {e}"),
            }
        }

        esp_idf_svc::hal::delay::FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
