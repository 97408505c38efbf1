//! MQTT telemetry adapter.
//!
//! Implements [`EventSink`] by publishing bridge events under a base topic,
//! and turns inbound messages into [`MqttEvent`]s for the scheduler loop.
//!
//! | Subtopic         | Direction | Payload                          |
//! |------------------|-----------|----------------------------------|
//! | `state`          | out       | status JSON, booleans `ON`/`OFF` |
//! | `available`      | out       | `online` / `offline`             |
//! | `bt_status`      | out       | link status string               |
//! | `command`        | in        | command name                     |
//! | `set_volume`     | in        | integer 0–50                     |
//! | `set_subwoofer`  | in        | integer 0–32                     |
//! | `reconnect`, `restart`, `reset_pairing` | in | payload ignored   |
//!
//! All outbound messages are retained.  On ESP-IDF the client's receive
//! loop runs on its own thread and hands events to the scheduler through
//! the bounded [`INBOX`], so bridge state is only ever touched from one
//! thread.
//!
//! ```text
//! ┌──────────────┐  MqttEvent   ┌────────────────┐
//! │  mqtt-rx     │─────────────▶│ scheduler loop │
//! │  (thread)    │  INBOX (8)   │ (main task)    │
//! └──────────────┘              └────────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};
use serde::Serialize;

use crate::app::commands::topic;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::protocol::status::{InputSource, StatusRecord, SurroundMode};

#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};

pub const STATE: &str = "state";
pub const AVAILABLE: &str = "available";
pub const BT_STATUS: &str = "bt_status";
pub const TEMPERATURE: &str = "temperature";

/// Inbound payloads above this size are dropped.
pub const MAX_PAYLOAD_BYTES: usize = 64;

/// Inbound topics above this length are dropped.
pub const MAX_TOPIC_BYTES: usize = 128;

/// Events queued while the scheduler is busy (a convergence run or a
/// status read can hold it for seconds).
pub const INBOX_DEPTH: usize = 8;

// ───────────────────────────────────────────────────────────────
// Topics
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_owned(),
        }
    }

    pub fn full(&self, subtopic: &str) -> String {
        format!("{}/{}", self.base, subtopic)
    }

    /// The subtopic of `topic`, if it lives under the base.
    pub fn strip<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic.strip_prefix(self.base.as_str())?.strip_prefix('/')
    }

    /// Every topic the bridge listens on.
    pub fn subscriptions(&self) -> [String; 6] {
        [
            topic::COMMAND,
            topic::SET_VOLUME,
            topic::SET_SUBWOOFER,
            topic::RECONNECT,
            topic::RESTART,
            topic::RESET_PAIRING,
        ]
        .map(|s| self.full(s))
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound formatting
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Serialize)]
struct StatePayload {
    power: OnOff,
    input: InputSource,
    muted: OnOff,
    volume: u8,
    subwoofer: u8,
    surround: SurroundMode,
    bass_ext: OnOff,
    clear_voice: OnOff,
}

#[derive(Serialize)]
enum OnOff {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl From<bool> for OnOff {
    fn from(b: bool) -> Self {
        if b { Self::On } else { Self::Off }
    }
}

/// Render a status record as the `state` JSON document.
pub fn state_json(s: &StatusRecord) -> serde_json::Result<String> {
    serde_json::to_string(&StatePayload {
        power: s.power.into(),
        input: s.input,
        muted: s.muted.into(),
        volume: s.volume,
        subwoofer: s.subwoofer,
        surround: s.surround,
        bass_ext: s.bass_ext.into(),
        clear_voice: s.clear_voice.into(),
    })
}

/// Map an event to the message it publishes, if any.
pub fn format_event(topics: &Topics, event: &AppEvent) -> Option<OutboundMessage> {
    let (subtopic, payload) = match event {
        AppEvent::StatusChanged(s) => match state_json(s) {
            Ok(json) => (STATE, json),
            Err(e) => {
                warn!("MQTT: state serialisation failed: {e}");
                return None;
            }
        },
        AppEvent::Availability(online) => {
            (AVAILABLE, if *online { "online" } else { "offline" }.to_owned())
        }
        AppEvent::LinkStatus(status) => (BT_STATUS, (*status).to_owned()),
        AppEvent::ChipTemperature(celsius) => (TEMPERATURE, format!("{celsius:.1}")),
        AppEvent::Started => return None,
    };
    Some(OutboundMessage {
        topic: topics.full(subtopic),
        payload,
        retain: true,
    })
}

// ───────────────────────────────────────────────────────────────
// Inbound events
// ───────────────────────────────────────────────────────────────

/// What the receive loop hands to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent {
    Connected,
    Disconnected,
    Message {
        topic: heapless::String<MAX_TOPIC_BYTES>,
        payload: heapless::Vec<u8, MAX_PAYLOAD_BYTES>,
    },
}

impl MqttEvent {
    /// Copy a received message into fixed buffers.  `None` when either
    /// part is too large.
    pub fn message(topic: &str, data: &[u8]) -> Option<Self> {
        let mut t = heapless::String::new();
        t.push_str(topic).ok()?;
        let payload = heapless::Vec::from_slice(data).ok()?;
        Some(Self::Message { topic: t, payload })
    }

    fn describe(&self) -> &str {
        match self {
            Self::Connected => "connect notice",
            Self::Disconnected => "disconnect notice",
            Self::Message { topic, .. } => topic.as_str(),
        }
    }
}

/// Bounded hand-off from the receive thread to the scheduler loop.
pub struct Inbox(Channel<CriticalSectionRawMutex, MqttEvent, INBOX_DEPTH>);

impl Inbox {
    pub const fn new() -> Self {
        Self(Channel::new())
    }

    /// Queue `event` without blocking.  Returns `false` (and logs) when the
    /// inbox is full and the event was dropped.
    pub fn forward(&self, event: MqttEvent) -> bool {
        match self.0.try_send(event) {
            Ok(()) => true,
            Err(embassy_sync::channel::TrySendError::Full(ev)) => {
                warn!("MQTT: inbox full, dropping {}", ev.describe());
                false
            }
        }
    }

    /// Next queued event, if any.
    pub fn next(&self) -> Option<MqttEvent> {
        self.0.try_receive().ok()
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound events for the scheduler loop.
pub static INBOX: Inbox = Inbox::new();

// ───────────────────────────────────────────────────────────────
// MqttSink
// ───────────────────────────────────────────────────────────────

/// Broker connection settings, taken from build-time secrets.
pub struct BrokerSettings<'a> {
    pub url: &'a str,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

pub struct MqttSink {
    topics: Topics,
    #[cfg(target_os = "espidf")]
    client: EspMqttClient<'static>,
    #[cfg(not(target_os = "espidf"))]
    published: Vec<OutboundMessage>,
}

impl MqttSink {
    /// Connect to the broker and start the receive thread, which feeds
    /// [`INBOX`].
    ///
    /// The availability topic carries a retained `offline` last-will.
    #[cfg(target_os = "espidf")]
    pub fn connect(settings: &BrokerSettings<'_>, topics: Topics) -> anyhow::Result<Self> {
        let will_topic = topics.full(AVAILABLE);
        let conf = MqttClientConfiguration {
            client_id: Some(settings.client_id),
            username: settings.username,
            password: settings.password,
            lwt: Some(LwtConfiguration {
                topic: &will_topic,
                payload: b"offline",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            ..Default::default()
        };
        let (client, mut conn) = EspMqttClient::new(settings.url, &conf)?;

        std::thread::Builder::new()
            .name("mqtt-rx".into())
            .stack_size(6 * 1024)
            .spawn(move || {
                while let Ok(event) = conn.next() {
                    let forwarded = match event.payload() {
                        EventPayload::Connected(_) => Some(MqttEvent::Connected),
                        EventPayload::Disconnected => Some(MqttEvent::Disconnected),
                        EventPayload::Received {
                            topic: Some(topic),
                            data,
                            details: Details::Complete,
                            ..
                        } => MqttEvent::message(topic, data).or_else(|| {
                            warn!("MQTT: oversized message on {topic} ({} bytes)", data.len());
                            None
                        }),
                        EventPayload::Received { topic, data, .. } => {
                            warn!("MQTT: dropped message on {topic:?} ({} bytes)", data.len());
                            None
                        }
                        _ => None,
                    };
                    if let Some(ev) = forwarded {
                        INBOX.forward(ev);
                    }
                }
                warn!("MQTT: receive loop ended");
            })?;

        log::info!("MQTT: connecting to {}", settings.url);
        Ok(Self { topics, client })
    }

    /// Host simulation: messages are recorded instead of sent.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(topics: Topics) -> Self {
        Self {
            topics,
            published: Vec::new(),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn published(&self) -> &[OutboundMessage] {
        &self.published
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Subscribe to every inbound topic.  Call after each (re)connect.
    #[cfg(target_os = "espidf")]
    pub fn subscribe_all(&mut self) {
        for t in self.topics.subscriptions() {
            if let Err(e) = self.client.subscribe(&t, QoS::AtMostOnce) {
                warn!("MQTT: subscribe {t} failed: {e}");
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn subscribe_all(&mut self) {
        debug!("MQTT: subscribed to {:?}", self.topics.subscriptions());
    }

    fn publish(&mut self, msg: OutboundMessage) {
        debug!("MQTT: {} <- {}", msg.topic, msg.payload);

        #[cfg(target_os = "espidf")]
        if let Err(e) = self.client.enqueue(
            &msg.topic,
            QoS::AtLeastOnce,
            msg.retain,
            msg.payload.as_bytes(),
        ) {
            warn!("MQTT: publish to {} failed: {e}", msg.topic);
        }

        #[cfg(not(target_os = "espidf"))]
        self.published.push(msg);
    }
}

impl EventSink for MqttSink {
    fn emit(&mut self, event: &AppEvent) {
        if let Some(msg) = format_event(&self.topics, event) {
            self.publish(msg);
        }
    }
}
