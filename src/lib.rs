//! FishFeeder library.
//!
//! Everything the binary wires together, exposed for integration tests
//! and host-side simulation.  Linux-only backends sit behind the `linux`
//! feature in [`adapters`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod rpc;
pub mod safety;
pub mod sensors;
pub mod system;
pub mod vision;

mod worker;
