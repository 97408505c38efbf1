//! Bridge service: the hexagonal core.
//!
//! [`BridgeService`] owns the connection manager, the status poller, and
//! the convergence controller.  It exposes a hardware-agnostic API; the
//! event sink is injected at each call site, making the whole service
//! testable with mock adapters.
//!
//! ```text
//!  SerialLink ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!  TimePort   ──▶ │        BridgeService         │
//!  Persistence ◀─▶│ Connection · Poller · Conv.  │ ◀── AppCommand
//!                 └─────────────────────────────┘
//! ```

use log::{info, warn};

use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, LinkEdge};
use crate::convergence::{ConvergenceController, ConvergenceReport, ToggleControl};
use crate::diagnostics::DiagnosticsReport;
use crate::error::Result;
use crate::poller::{PollOutcome, StatusPoller, TemperatureMonitor};
use crate::protocol::status::StatusRecord;

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{EventSink, PersistencePort, SerialLink, TimePort};

/// What a successfully handled [`AppCommand`] produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutcome {
    Sent,
    Converged(ConvergenceReport),
    Status(StatusRecord),
    Connected,
    PairingReset,
    /// The caller must reboot; the service has nothing to do.
    RestartRequested,
}

// ───────────────────────────────────────────────────────────────
// BridgeService
// ───────────────────────────────────────────────────────────────

pub struct BridgeService<L, C, P> {
    conn: ConnectionManager<L, C, P>,
    poller: StatusPoller,
    convergence: ConvergenceController,
    command_settle_ms: u32,
    /// Last link status string handed to the sink.
    last_link_status: Option<&'static str>,
    temperature: TemperatureMonitor,
}

impl<L: SerialLink, C: TimePort, P: PersistencePort> BridgeService<L, C, P> {
    pub fn new(conn: ConnectionManager<L, C, P>, config: &BridgeConfig) -> Self {
        Self {
            conn,
            poller: StatusPoller::new(config.poll_interval_ms),
            convergence: ConvergenceController::new(config),
            command_settle_ms: config.command_settle_ms,
            last_link_status: None,
            temperature: TemperatureMonitor::new(config.temperature_delta_c),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce startup and make the first connect attempt.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started);
        self.publish_link_status(sink);

        let result = self.conn.connect();
        self.after_connect(&result, sink);
        if result.is_ok() {
            self.refresh(sink);
        }
        info!("BridgeService started ({})", self.conn.state().phase.as_str());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one scheduler pass: edge detection, gated reconnect, status poll.
    pub fn tick(&mut self, sink: &mut impl EventSink) -> PollOutcome {
        match self.conn.tick() {
            Some(LinkEdge::Up) => sink.emit(&AppEvent::Availability(true)),
            Some(LinkEdge::Down { .. }) => sink.emit(&AppEvent::Availability(false)),
            None => {}
        }

        if let Some(result) = self.conn.poll_reconnect() {
            self.after_connect(&result, sink);
        }

        let outcome = self.poller.tick(&mut self.conn, sink);
        self.publish_link_status(sink);
        outcome
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.  Errors are returned to the caller
    /// and never change the connection phase on their own.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        sink: &mut impl EventSink,
    ) -> Result<CommandOutcome> {
        let outcome = self.dispatch(cmd, sink);
        self.publish_link_status(sink);
        if let Err(e) = &outcome {
            warn!("CMD: {cmd:?} failed: {e}");
        }
        outcome
    }

    fn dispatch(&mut self, cmd: AppCommand, sink: &mut impl EventSink) -> Result<CommandOutcome> {
        match cmd {
            AppCommand::Send { name, refresh } => {
                self.conn.send_command(name)?;
                if refresh {
                    self.conn.delay_ms(self.command_settle_ms);
                    self.refresh(sink);
                }
                Ok(CommandOutcome::Sent)
            }
            AppCommand::SetVolume(target) => self
                .converge(ToggleControl::Volume, target, sink)
                .map(CommandOutcome::Converged),
            AppCommand::SetSubwoofer(target) => self
                .converge(ToggleControl::Subwoofer, target, sink)
                .map(CommandOutcome::Converged),
            AppCommand::Reconnect => {
                info!("BT: manual reconnect");
                let result = self.conn.connect_now();
                self.after_connect(&result, sink);
                result?;
                self.refresh(sink);
                Ok(CommandOutcome::Connected)
            }
            AppCommand::ResetPairing => {
                let was_connected = self.conn.is_connected();
                self.conn.reset_pairing();
                if was_connected {
                    sink.emit(&AppEvent::Availability(false));
                }
                Ok(CommandOutcome::PairingReset)
            }
            AppCommand::RequestStatus => {
                let record = self.conn.request_status()?;
                self.poller.observe(record, sink);
                Ok(CommandOutcome::Status(record))
            }
            AppCommand::Restart => Ok(CommandOutcome::RestartRequested),
        }
    }

    fn converge(
        &mut self,
        control: ToggleControl,
        target: u8,
        sink: &mut impl EventSink,
    ) -> Result<ConvergenceReport> {
        self.convergence
            .converge(control, target, &mut self.conn, &mut self.poller, sink)
    }

    // ── Telemetry ─────────────────────────────────────────────

    /// Feed a chip temperature reading.  The scheduler calls this on the
    /// status poll cadence (whenever [`tick`](Self::tick) did not skip).
    pub fn observe_temperature(&mut self, celsius: f32, sink: &mut impl EventSink) -> bool {
        self.temperature.observe(celsius, sink)
    }

    /// The telemetry transport (re)connected: republish everything it
    /// may have missed.
    pub fn resync(&mut self, sink: &mut impl EventSink) {
        self.last_link_status = None;
        sink.emit(&AppEvent::Availability(self.conn.is_connected()));
        self.publish_link_status(sink);
        if self.conn.is_connected() {
            self.refresh(sink);
        } else if self.poller.last_known().is_valid() {
            sink.emit(&AppEvent::StatusChanged(*self.poller.last_known()));
        }
        if let Some(celsius) = self.temperature.last_published() {
            sink.emit(&AppEvent::ChipTemperature(celsius));
        }
    }

    /// Poll once and publish the result unconditionally.
    fn refresh(&mut self, sink: &mut impl EventSink) {
        match self.conn.request_status() {
            Ok(record) => self.poller.publish(record, sink),
            Err(e) => warn!("STATUS: refresh failed: {e}"),
        }
    }

    fn after_connect(&mut self, result: &Result<()>, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Availability(result.is_ok()));
        self.publish_link_status(sink);
    }

    fn publish_link_status(&mut self, sink: &mut impl EventSink) {
        let status = self.conn.state().phase.as_str();
        if self.last_link_status != Some(status) {
            self.last_link_status = Some(status);
            sink.emit(&AppEvent::LinkStatus(status));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn connection(&self) -> &ConnectionManager<L, C, P> {
        &self.conn
    }

    pub fn last_status(&self) -> &StatusRecord {
        self.poller.last_known()
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        DiagnosticsReport::collect(self.conn.state(), self.conn.target(), self.conn.now_ms())
            .with_chip_temperature(self.temperature.last_reading())
    }
}
