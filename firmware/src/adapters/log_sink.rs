//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured bridge events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production).  The MQTT
//! sink implements the same trait; [`Tee`] feeds both.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::StatusChanged(s) => {
                info!(
                    "STATUS | power={} | input={} | vol={} sub={} | mute={} | \
                     surround={} | bass_ext={} clear_voice={}",
                    if s.power { "ON" } else { "OFF" },
                    s.input.as_str(),
                    s.volume,
                    s.subwoofer,
                    if s.muted { "ON" } else { "OFF" },
                    s.surround.as_str(),
                    if s.bass_ext { "ON" } else { "OFF" },
                    if s.clear_voice { "ON" } else { "OFF" },
                );
            }
            AppEvent::LinkStatus(status) => {
                info!("LINK | {status}");
            }
            AppEvent::Availability(online) => {
                info!("AVAIL | {}", if *online { "online" } else { "offline" });
            }
            AppEvent::ChipTemperature(celsius) => {
                info!("TEMP | {celsius:.1} °C");
            }
            AppEvent::Started => {
                info!("START | bridge service up");
            }
        }
    }
}

/// Fan one event out to two sinks.
pub struct Tee<'a, A, B>(pub &'a mut A, pub &'a mut B);

impl<A: EventSink, B: EventSink> EventSink for Tee<'_, A, B> {
    fn emit(&mut self, event: &AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}
