//! Port traits: the hexagonal boundary between the feed controller and the
//! outside world.
//!
//! ```text
//!   hardware adapter ──▶ component (driver/sensor) ──▶ role trait ──▶ FeedController
//!                                                  ◀── handler trait ◀──┘
//! ```
//!
//! Three groups live here:
//!
//! - **Hardware collaborators** (`EdgeSource`, `AnalogBusOpener`,
//!   `StillImageSource`, `FrameDecoder`, `Classifier`, `FrameStore`,
//!   `ConfigStore`): implemented by adapters, consumed by components.
//!   Digital outputs use `embedded_hal::digital::OutputPin` and the analog
//!   bus uses `embedded_hal::i2c::I2c` directly.
//! - **Component roles** (`Worker`, `FeedActuator`, `CaptureTrigger`,
//!   `SampleSource`): implemented by the drivers and sensors, consumed by
//!   the controller as trait objects so tests can swap in mocks.
//! - **Handlers** (`MotionHandler`, `FrameHandler`, `SampleHandler`): one
//!   single-method trait per notification; registered on a component before
//!   it starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SystemConfig;
use crate::error::Result;
use crate::safety::FeedCommand;
use crate::vision::{Classification, Frame};

use super::events::{AppEvent, MotionEvent, Sample};

// ───────────────────────────────────────────────────────────────
// Hardware collaborators
// ───────────────────────────────────────────────────────────────

/// Input half of a digital line configured for edge events.
pub trait EdgeSource: Send + 'static {
    /// Block until an edge arrives or `timeout` elapses.
    ///
    /// `Ok(None)` is a timeout; `Err` means the line itself failed.
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<Option<MotionEvent>>;
}

/// Opens the analog channel lazily, on first use.
pub trait AnalogBusOpener: Send + Sync + 'static {
    type Bus: embedded_hal::i2c::I2c + Send + 'static;

    fn open(&self) -> Result<Self::Bus>;
}

/// One-shot still acquisition into a file.
pub trait StillImageSource: Send + 'static {
    /// Write a decodable image of `width`×`height` to `path`.  Blocking.
    fn acquire(&mut self, path: &Path, width: u32, height: u32, quality: u8) -> Result<()>;
}

/// Turns the acquired file into a [`Frame`].
pub trait FrameDecoder: Send + 'static {
    fn decode(&self, path: &Path) -> Result<Frame>;
}

/// Pure detection function.
pub trait Classifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> Classification;
}

/// Keeps classified frames on disk.
pub trait FrameStore: Send + Sync {
    /// Remove everything stored by earlier runs.
    fn reset(&self) -> Result<()>;

    /// Persist `frame`; returns the path reported as the last image.
    fn store(&self, frame: &Frame, positive: bool) -> Result<Option<PathBuf>>;
}

/// Loads and persists system configuration.
///
/// Implementations must validate before persisting; invalid values are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigStore {
    /// Returns [`SystemConfig::default()`] if nothing is stored.
    fn load(&self) -> core::result::Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> core::result::Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Component roles
// ───────────────────────────────────────────────────────────────

/// Lifecycle of a component that owns a worker thread.
pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawn the worker.  No-op if it is already running.
    fn start(&self) -> Result<()>;

    /// Stop and join the worker.  After this returns no handler of this
    /// component will be invoked again until the next `start()`.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// `false` once the underlying resource failed to open or the worker
    /// exited on an error.
    fn is_healthy(&self) -> bool;
}

/// The feed motor.
pub trait FeedActuator: Send + Sync {
    /// Blocking software PWM; `false` if the motor is unavailable or a line
    /// write failed.
    fn run(&self, cmd: &FeedCommand) -> bool;

    fn stop(&self);

    fn is_ready(&self) -> bool;
}

/// The camera worker.
pub trait CaptureTrigger: Worker {
    /// Request a capture without blocking.  Requests coalesce.
    fn capture_image(&self);
}

/// The analog (pH) channel.
pub trait SampleSource: Worker {
    fn initialize(&self) -> bool;

    fn cleanup(&self);

    /// One blocking conversion cycle; handlers are notified on success.
    fn read_sample(&self) -> Result<Sample>;

    fn is_ready(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Handlers
// ───────────────────────────────────────────────────────────────

pub trait MotionHandler: Send + Sync {
    fn on_motion(&self, event: &MotionEvent);
}

pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: Frame);
}

pub trait SampleHandler: Send + Sync {
    fn on_sample(&self, sample: &Sample);
}

// ───────────────────────────────────────────────────────────────
// Event sink (controller → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The controller emits structured [`AppEvent`]s through this port.
/// Called from several worker threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Request handling (request server → controller)
// ───────────────────────────────────────────────────────────────

/// Result of a POST command, reported back to the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Accepted,
    Rejected(String),
}

/// Driving port used by the request server.
pub trait RequestHandler: Send + Sync {
    /// Status JSON for GET.
    fn status_json(&self) -> String;

    /// Parse and execute one POST body.
    fn handle_command(&self, body: &str) -> CommandReply;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigStore`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config could not be parsed.
    Corrupted(String),
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the backing file.
    IoError(String),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
