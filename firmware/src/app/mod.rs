//! Application core: bridge logic behind port traits.
//!
//! This module holds the business rules for the bridge: command routing,
//! the per-tick schedule, and link-status publication.  All interaction
//! with the radio, clock, and flash happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without real
//! peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
