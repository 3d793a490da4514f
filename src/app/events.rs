//! Application data and outbound events.
//!
//! Inbound data ([`MotionEvent`], [`Sample`]) flows from the sensor workers
//! into the [`FeedController`](super::service::FeedController).  Outbound
//! [`AppEvent`]s leave the controller through the
//! [`EventSink`](super::ports::EventSink) port; adapters decide what to do
//! with them (log lines today).

use std::time::SystemTime;

// ── Inbound data ──────────────────────────────────────────────

/// Direction of a digital transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// One edge reported by the motion line.  Ephemeral, never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub edge: Edge,
    pub timestamp: SystemTime,
}

impl MotionEvent {
    pub fn now(edge: Edge) -> Self {
        Self {
            edge,
            timestamp: SystemTime::now(),
        }
    }
}

/// One analog conversion, already calibrated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Signed conversion code as read from the ADC.
    pub raw_code: i16,
    pub voltage: f32,
    /// Calibrated value (pH).
    pub derived_value: f32,
    pub timestamp: SystemTime,
}

// ── Outbound events ───────────────────────────────────────────

/// Who asked for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedTrigger {
    /// Manual request that bypasses detection state.
    Override,
    /// Positive classification while auto-mode was enabled.
    Automatic,
}

/// Why a feed request did not run the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither override nor (auto-mode and positive detection).
    PolicyDenied,
    /// The motor line never initialised.
    ActuatorNotReady,
    /// A step of the sequence failed part-way.
    SequenceFailed,
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PolicyDenied => write!(f, "no fish detected and no override"),
            Self::ActuatorNotReady => write!(f, "motor not initialized"),
            Self::SequenceFailed => write!(f, "feed sequence failed"),
        }
    }
}

/// Structured events emitted by the feed controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The controller started its workers.
    Started { auto_mode: bool },
    /// Auto-mode was switched.
    AutoModeChanged(bool),
    /// A rising edge arrived on the motion line.
    MotionDetected { capture_requested: bool },
    /// A frame was classified.
    FrameClassified { positive: bool, regions: usize },
    /// A feed sequence completed and its counter moved.
    FeedCompleted { trigger: FeedTrigger, count: u64 },
    /// A feed request was not executed.
    FeedSkipped { trigger: FeedTrigger, reason: SkipReason },
    /// A new analog sample replaced the previous one.
    SampleUpdated(Sample),
    /// A component failed and is now inert.
    ComponentFault(&'static str),
    /// The controller shut its components down.
    Stopped,
}
