//! Convergence controller: reach a numeric target with up/down toggles.
//!
//! The soundbar has no absolute "set volume" command.  The controller reads
//! the current value, sends a bounded run of single-step toggles with a
//! fixed gap between them, then polls once more to confirm.

use log::{info, warn};

use crate::app::ports::{EventSink, PersistencePort, SerialLink, TimePort};
use crate::config::BridgeConfig;
use crate::connection::ConnectionManager;
use crate::error::{LinkError, Result};
use crate::poller::StatusPoller;
use crate::protocol::commands;
use crate::protocol::status::StatusRecord;

/// A control the soundbar only exposes as up/down toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleControl {
    Volume,
    Subwoofer,
}

impl ToggleControl {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Volume => "Volume",
            Self::Subwoofer => "Subwoofer",
        }
    }

    fn read(self, record: &StatusRecord) -> u8 {
        match self {
            Self::Volume => record.volume,
            Self::Subwoofer => record.subwoofer,
        }
    }
}

/// Per-control toggle geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleParams {
    pub up: &'static str,
    pub down: &'static str,
    /// Units moved by one toggle.
    pub step: u8,
    /// Highest settable value.
    pub max: u8,
    /// Upper bound on toggles per request.
    pub max_steps: u8,
}

/// Commands to send for one request.  `steps == 0` means send nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TogglePlan {
    pub command: &'static str,
    pub steps: u8,
}

/// Outcome of [`ConvergenceController::converge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub control: ToggleControl,
    pub from: u8,
    pub target: u8,
    pub plan: TogglePlan,
    /// Toggles the link accepted.  Less than `plan.steps` after a write failure.
    pub sent: u8,
    /// Result of the confirmation poll.
    pub confirmed: Option<StatusRecord>,
}

pub struct ConvergenceController {
    volume: ToggleParams,
    subwoofer: ToggleParams,
    toggle_delay_ms: u32,
    settle_ms: u32,
}

impl ConvergenceController {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            volume: ToggleParams {
                up: commands::VOLUME_UP,
                down: commands::VOLUME_DOWN,
                step: 1,
                max: config.volume_max,
                max_steps: config.volume_max_steps,
            },
            subwoofer: ToggleParams {
                up: commands::SUBWOOFER_UP,
                down: commands::SUBWOOFER_DOWN,
                step: config.subwoofer_step.max(1),
                max: config.subwoofer_max,
                max_steps: config.subwoofer_max_steps,
            },
            toggle_delay_ms: config.toggle_delay_ms,
            settle_ms: config.command_settle_ms,
        }
    }

    pub fn params(&self, control: ToggleControl) -> &ToggleParams {
        match control {
            ToggleControl::Volume => &self.volume,
            ToggleControl::Subwoofer => &self.subwoofer,
        }
    }

    /// Toggles needed to move `current` toward `target`.
    ///
    /// Integer division truncates, so a target between steps stops short
    /// rather than overshooting.
    pub fn plan(&self, control: ToggleControl, current: u8, target: u8) -> TogglePlan {
        let p = self.params(control);
        let diff = i16::from(target) - i16::from(current);
        let raw = diff.unsigned_abs() / u16::from(p.step);
        let steps = raw.min(u16::from(p.max_steps)) as u8;
        let command = if diff > 0 { p.up } else { p.down };
        TogglePlan { command, steps }
    }

    /// Drive `control` to `target`.
    ///
    /// Fails without sending anything when the link is down or the
    /// baseline read fails.  After the toggles a confirmation poll always
    /// runs and its result is published, even when nothing was sent.
    pub fn converge<L, C, P>(
        &self,
        control: ToggleControl,
        target: u8,
        conn: &mut ConnectionManager<L, C, P>,
        poller: &mut StatusPoller,
        sink: &mut impl EventSink,
    ) -> Result<ConvergenceReport>
    where
        L: SerialLink,
        C: TimePort,
        P: PersistencePort,
    {
        if !conn.is_connected() {
            return Err(LinkError::NotConnected.into());
        }

        let target = target.min(self.params(control).max);
        let baseline = conn.request_status().inspect_err(|e| {
            warn!("{}: baseline read failed, aborting: {e}", control.as_str());
        })?;
        let from = control.read(&baseline);
        let plan = self.plan(control, from, target);
        info!(
            "{}: current {from}, target {target}, {} x {}",
            control.as_str(),
            plan.steps,
            plan.command
        );

        let mut sent = 0u8;
        for _ in 0..plan.steps {
            if let Err(e) = conn.send_command(plan.command) {
                warn!("{}: toggle {} failed, stopping: {e}", control.as_str(), sent + 1);
                break;
            }
            sent += 1;
            conn.delay_ms(self.toggle_delay_ms);
        }

        conn.delay_ms(self.settle_ms);
        let confirmed = match conn.request_status() {
            Ok(record) => {
                info!("{}: now {}", control.as_str(), control.read(&record));
                poller.publish(record, sink);
                Some(record)
            }
            Err(e) => {
                warn!("{}: confirmation poll failed: {e}", control.as_str());
                None
            }
        };

        Ok(ConvergenceReport {
            control,
            from,
            target,
            plan,
            sent,
            confirmed,
        })
    }
}
