//! Fuzz target: `parse_command`
//!
//! Any POST body must either parse or produce a protocol error, never
//! panic.
//!
//! cargo fuzz run fuzz_parse_command

#![no_main]

use fishfeeder::app::commands::parse_command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        let _ = parse_command(body);
    }
});
