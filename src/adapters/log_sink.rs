//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (the binary routes it to stderr through
//! `tracing-subscriber`).  A push adapter (websocket, MQTT) would implement
//! the same trait.

use log::{info, warn};

use crate::adapters::time::format_local;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] on one line.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: &AppEvent) {
        match event {
            AppEvent::Started { auto_mode } => {
                info!("START | auto_mode={}", auto_mode);
            }
            AppEvent::AutoModeChanged(enabled) => {
                info!("MODE  | auto={}", enabled);
            }
            AppEvent::MotionDetected { capture_requested } => {
                info!("MOTION| capture_requested={}", capture_requested);
            }
            AppEvent::FrameClassified { positive, regions } => {
                info!("FRAME | fish={} regions={}", positive, regions);
            }
            AppEvent::FeedCompleted { trigger, count } => {
                info!("FEED  | {:?} count={}", trigger, count);
            }
            AppEvent::FeedSkipped { trigger, reason } => {
                info!("FEED  | {:?} skipped: {}", trigger, reason);
            }
            AppEvent::SampleUpdated(s) => {
                info!(
                    "PH    | pH={:.2} volts={:.4} raw={} at {}",
                    s.derived_value,
                    s.voltage,
                    s.raw_code,
                    format_local(s.timestamp)
                );
            }
            AppEvent::ComponentFault(name) => {
                warn!("FAULT | component '{}' inert", name);
            }
            AppEvent::Stopped => {
                info!("STOP  | components released");
            }
        }
    }
}
