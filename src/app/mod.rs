//! Application core: feed policy, status, and the request protocol.
//!
//! Everything here talks to hardware only through the **port traits** in
//! [`ports`], so the controller is testable with in-memory doubles.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
pub mod status;
