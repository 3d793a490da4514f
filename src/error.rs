//! Unified error types for the feeder.
//!
//! A single `Error` enum that every component converts into, keeping the
//! orchestrator's handling uniform.  The taxonomy mirrors how failures are
//! treated at runtime:
//!
//! | Variant        | Runtime consequence                                  |
//! |----------------|------------------------------------------------------|
//! | `HardwareInit` | component stays not-ready, the rest keeps running    |
//! | `Io`           | one operation fails, caller may retry later          |
//! | `Protocol`     | request dropped after logging                        |
//! | `ThreadFault`  | worker exits, health flag cleared                    |
//! | `Config`       | startup rejected                                     |

use core::fmt;

use crate::app::commands::ProtocolError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Chip, line, bus or camera could not be opened or requested.
    HardwareInit(HardwareInitError),
    /// A single read, write or capture failed.
    Io(IoError),
    /// A command payload could not be understood.
    Protocol(ProtocolError),
    /// A worker thread could not be spawned or terminated abnormally.
    ThreadFault(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareInit(e) => write!(f, "hardware init: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::ThreadFault(name) => write!(f, "thread fault in {name}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware initialisation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareInitError {
    /// GPIO chip device could not be opened.
    ChipOpen(String),
    /// A GPIO line could not be requested as input/output.
    LineRequest(u32),
    /// The analog bus device could not be opened.
    BusOpen(String),
    /// The component was never given a working resource.
    Unavailable(&'static str),
}

impl fmt::Display for HardwareInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChipOpen(path) => write!(f, "cannot open GPIO chip {path}"),
            Self::LineRequest(line) => write!(f, "cannot request GPIO line {line}"),
            Self::BusOpen(path) => write!(f, "cannot open bus {path}"),
            Self::Unavailable(what) => write!(f, "{what} unavailable"),
        }
    }
}

impl From<HardwareInitError> for Error {
    fn from(e: HardwareInitError) -> Self {
        Self::HardwareInit(e)
    }
}

// ---------------------------------------------------------------------------
// Transient I/O errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    /// Waiting for or reading an edge event failed.
    EdgeWait(String),
    /// Writing to the analog bus failed.
    BusWrite,
    /// Reading from the analog bus failed.
    BusRead,
    /// The still-image acquisition command failed.
    Capture(String),
    /// The captured file could not be decoded.
    Decode(String),
    /// Writing an archived frame failed.
    Archive(String),
    /// Binding or serving the request socket failed.
    Socket(String),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdgeWait(msg) => write!(f, "edge wait failed: {msg}"),
            Self::BusWrite => write!(f, "bus write failed"),
            Self::BusRead => write!(f, "bus read failed"),
            Self::Capture(msg) => write!(f, "capture failed: {msg}"),
            Self::Decode(msg) => write!(f, "decode failed: {msg}"),
            Self::Archive(msg) => write!(f, "archive failed: {msg}"),
            Self::Socket(msg) => write!(f, "socket error: {msg}"),
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_detail() {
        let e: Error = HardwareInitError::LineRequest(17).into();
        assert_eq!(e.to_string(), "hardware init: cannot request GPIO line 17");

        let e: Error = IoError::Capture("exit status 1".into()).into();
        assert_eq!(e.to_string(), "io: capture failed: exit status 1");
    }

    #[test]
    fn protocol_errors_convert() {
        let e: Error = ProtocolError::MissingCommand.into();
        assert!(matches!(e, Error::Protocol(ProtocolError::MissingCommand)));
    }
}
