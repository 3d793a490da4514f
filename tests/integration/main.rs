//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem through the
//! public API, on simulated devices.  Everything runs on the host with no
//! real hardware required.

mod feed_controller_tests;
mod mock_hw;
mod pipeline_tests;
mod request_server_tests;
