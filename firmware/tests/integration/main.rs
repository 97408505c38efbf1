//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one layer of the bridge
//! against scripted mock adapters.  All tests run on the host with no
//! radio required.

#![cfg(not(target_os = "espidf"))]

mod connection_tests;
mod mock_link;
mod service_tests;
