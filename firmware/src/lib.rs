//! YAS bridge firmware library.
//!
//! Exposes the protocol, link, and service layers for integration testing
//! and host simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod connection;
pub mod convergence;
pub mod diagnostics;
pub mod error;
pub mod link;
pub mod poller;
pub mod protocol;

pub mod adapters;
