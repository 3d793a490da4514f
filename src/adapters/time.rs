//! Host time adapter.
//!
//! - [`HostDelay`] implements `embedded_hal::delay::DelayNs` with
//!   `std::thread::sleep`, so drivers written against embedded-hal block the
//!   calling thread instead of spinning.
//! - The formatting helpers turn `SystemTime` into the strings used by the
//!   status JSON and the archive file names (local time via `chrono`).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};
use embedded_hal::delay::DelayNs;

/// Sleep-based delay for drivers running on a general-purpose OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Seconds since the Unix epoch (0 for times before it).
pub fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// `YYYY-mm-dd HH:MM:SS` in local time, as shown in the status JSON.
pub fn format_local(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `YYYY-mm-dd_HH-MM-SS` in local time, safe for file names.
pub fn file_stamp(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d_%H-%M-%S").to_string()
}
