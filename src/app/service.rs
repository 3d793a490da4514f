//! Feed controller, the hexagonal core.
//!
//! [`FeedController`] owns the feed policy, the shared [`SystemStatus`] and
//! the component handles.  Components reach it through small relay
//! handlers that hold only a weak link, so the controller can own the
//! components without a reference cycle.
//!
//! ```text
//!  motion ──MotionRelay──▶ ┌──────────────────────┐ ──▶ EventSink
//!  camera ──ClassifyRelay─▶│    FeedController     │
//!  analog ──SampleRelay──▶ │  policy · status      │ ──▶ FeedActuator
//!  request server ───────▶ └──────────────────────┘
//! ```
//!
//! ## Feed policy
//!
//! | override | auto-mode | last frame positive | feeds? | counter           |
//! |----------|-----------|---------------------|--------|-------------------|
//! | yes      | any       | any                 | yes    | `feed_count`      |
//! | no       | on        | yes                 | yes    | `auto_feed_count` |
//! | no       | otherwise |                     | no     | none              |
//!
//! Sequences are serialized by the feed lock and counted only once the
//! final stop has been issued.  An automatic feed runs on the capture
//! thread, so no new frame is taken while the motor turns.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::SystemTime;

use log::{debug, error, info, warn};

use crate::config::{FeedStep, MAX_FEED_STEPS, SystemConfig};
use crate::error::Result;
use crate::safety::FeedCommand;
use crate::vision::{Classification, Frame};

use super::commands::{AppCommand, parse_command};
use super::events::{AppEvent, FeedTrigger, MotionEvent, Sample, SkipReason};
use super::ports::{
    CaptureTrigger, Classifier, CommandReply, EventSink, FeedActuator, FrameHandler, FrameStore,
    MotionHandler, RequestHandler, SampleHandler, SampleSource, Worker,
};
use super::status::{ComponentHealth, StatusSnapshot, SystemStatus};

/// What a feed request came to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Fed { trigger: FeedTrigger, count: u64 },
    Skipped(SkipReason),
}

/// The components the controller drives.
pub struct Collaborators {
    pub actuator: Arc<dyn FeedActuator>,
    pub sampler: Arc<dyn SampleSource>,
    pub motion: Arc<dyn Worker>,
    pub camera: Arc<dyn CaptureTrigger>,
    /// Keeps classified frames; `None` disables archiving.
    pub archive: Option<Arc<dyn FrameStore>>,
}

// ───────────────────────────────────────────────────────────────
// Relays (component → controller)
// ───────────────────────────────────────────────────────────────

/// Late-bound weak link to the controller.
///
/// Components are built (and their handlers registered) before the
/// controller exists; the link is bound once the controller is created.
/// Events arriving before that, or after the controller is dropped, are
/// ignored.
#[derive(Clone, Default)]
pub struct ControllerLink {
    target: Arc<OnceLock<Weak<FeedController>>>,
}

impl ControllerLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn controller(&self) -> Option<Arc<FeedController>> {
        self.target.get().and_then(Weak::upgrade)
    }

    pub fn motion_relay(&self) -> Arc<dyn MotionHandler> {
        Arc::new(MotionRelay(self.clone()))
    }

    /// Classifies each frame on the capture thread, then reports it.
    pub fn classifying_relay(&self, classifier: Arc<dyn Classifier>) -> Arc<dyn FrameHandler> {
        Arc::new(ClassifyingRelay {
            classifier,
            link: self.clone(),
        })
    }

    pub fn sample_relay(&self) -> Arc<dyn SampleHandler> {
        Arc::new(SampleRelay(self.clone()))
    }
}

struct MotionRelay(ControllerLink);

impl MotionHandler for MotionRelay {
    fn on_motion(&self, event: &MotionEvent) {
        if let Some(controller) = self.0.controller() {
            controller.on_motion(event);
        }
    }
}

struct ClassifyingRelay {
    classifier: Arc<dyn Classifier>,
    link: ControllerLink,
}

impl FrameHandler for ClassifyingRelay {
    fn on_frame(&self, frame: Frame) {
        let Some(controller) = self.link.controller() else {
            return;
        };
        let classification = self.classifier.classify(&frame);
        controller.on_classification(classification);
    }
}

struct SampleRelay(ControllerLink);

impl SampleHandler for SampleRelay {
    fn on_sample(&self, sample: &Sample) {
        if let Some(controller) = self.0.controller() {
            controller.on_sample(sample);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// FeedController
// ───────────────────────────────────────────────────────────────

pub struct FeedController {
    status: SystemStatus,
    sequence: heapless::Vec<FeedStep, MAX_FEED_STEPS>,
    periodic_sampling: bool,
    parts: Collaborators,
    sink: Arc<dyn EventSink>,
    feed_lock: Mutex<()>,
    mode_lock: Mutex<()>,
}

fn lock(m: &Mutex<()>) -> MutexGuard<'_, ()> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FeedController {
    /// Build the controller and bind `link` to it.
    ///
    /// Nothing starts here; call [`start`](Self::start).
    pub fn new(
        config: &SystemConfig,
        parts: Collaborators,
        sink: Arc<dyn EventSink>,
        link: &ControllerLink,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            status: SystemStatus::new(config.feed.auto_mode_at_startup),
            sequence: config.feed.sequence.clone(),
            periodic_sampling: config.analog.periodic,
            parts,
            sink,
            feed_lock: Mutex::new(()),
            mode_lock: Mutex::new(()),
        });
        if link.target.set(Arc::downgrade(&controller)).is_err() {
            warn!("Controller link was already bound; keeping the first controller");
        }
        controller
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring up the analog channel (and its sampling worker if periodic),
    /// then the producers if auto-mode is on.  Component failures are
    /// logged and reported as faults; the rest of the system keeps going.
    pub fn start(&self) {
        let sampler = &self.parts.sampler;
        if self.periodic_sampling {
            if let Err(e) = sampler.start() {
                self.fault(sampler.name(), &e);
            }
        } else if !sampler.initialize() {
            warn!("Analog channel did not initialise; pH reads will retry");
        }

        let auto_mode = {
            let _mode = lock(&self.mode_lock);
            let auto_mode = self.status.auto_mode();
            if auto_mode {
                self.start_producers();
            }
            auto_mode
        };
        info!("Feed controller started (auto_mode={})", auto_mode);
        self.sink.emit(&AppEvent::Started { auto_mode });
    }

    /// Stop every producer first, then release the actuator and the
    /// analog channel.
    pub fn shutdown(&self) {
        {
            let _mode = lock(&self.mode_lock);
            self.stop_producers();
        }
        self.parts.sampler.stop();
        {
            let _feed = lock(&self.feed_lock);
            self.parts.actuator.stop();
        }
        self.parts.sampler.cleanup();
        info!("Feed controller stopped");
        self.sink.emit(&AppEvent::Stopped);
    }

    fn start_producers(&self) {
        let motion = &self.parts.motion;
        if let Err(e) = motion.start() {
            self.fault(motion.name(), &e);
        }
        let camera = &self.parts.camera;
        if let Err(e) = camera.start() {
            self.fault(camera.name(), &e);
        }
    }

    fn stop_producers(&self) {
        self.parts.motion.stop();
        self.parts.camera.stop();
    }

    fn fault(&self, component: &'static str, err: &crate::error::Error) {
        error!("Component '{}' failed: {}", component, err);
        self.sink.emit(&AppEvent::ComponentFault(component));
    }

    // ── Auto-mode ─────────────────────────────────────────────

    pub fn set_auto_mode(&self, enabled: bool) {
        let _mode = lock(&self.mode_lock);
        self.status.set_auto_mode(enabled);
        if enabled {
            self.start_producers();
        } else {
            self.stop_producers();
        }
        info!("Auto mode {}", if enabled { "enabled" } else { "disabled" });
        self.sink.emit(&AppEvent::AutoModeChanged(enabled));
    }

    pub fn auto_mode(&self) -> bool {
        self.status.auto_mode()
    }

    // ── Feeding ───────────────────────────────────────────────

    /// Run the configured feed sequence if the policy allows it.  Blocks
    /// for the whole sequence.
    pub fn feed_fish(&self, override_detection: bool) -> FeedOutcome {
        let trigger = if override_detection {
            FeedTrigger::Override
        } else {
            FeedTrigger::Automatic
        };
        let _feed = lock(&self.feed_lock);

        let allowed =
            override_detection || (self.status.auto_mode() && self.status.fish_detected());
        if !allowed {
            debug!("Feed request denied: no override and no positive detection in auto mode");
            return self.skipped(trigger, SkipReason::PolicyDenied);
        }
        let actuator = &self.parts.actuator;
        if !actuator.is_ready() {
            warn!("Feed request ignored: motor not initialised");
            return self.skipped(trigger, SkipReason::ActuatorNotReady);
        }

        info!("Feeding ({:?})", trigger);
        for step in &self.sequence {
            let cmd = FeedCommand::from_step(step, override_detection);
            if !actuator.run(&cmd) {
                actuator.stop();
                error!("Feed sequence aborted at {}% step", cmd.duty_cycle_percent());
                return self.skipped(trigger, SkipReason::SequenceFailed);
            }
        }
        actuator.stop();

        let count = self.status.record_feed(trigger, SystemTime::now());
        info!("Feed complete ({:?}, count={})", trigger, count);
        self.sink.emit(&AppEvent::FeedCompleted { trigger, count });
        FeedOutcome::Fed { trigger, count }
    }

    fn skipped(&self, trigger: FeedTrigger, reason: SkipReason) -> FeedOutcome {
        self.sink.emit(&AppEvent::FeedSkipped { trigger, reason });
        FeedOutcome::Skipped(reason)
    }

    /// One manual motor run followed by an explicit stop.  Shares the feed
    /// lock so it never interleaves with a sequence.
    pub fn run_motor(&self, duty_cycle: i64, duration_ms: i64, period_ms: i64) -> bool {
        let _feed = lock(&self.feed_lock);
        let actuator = &self.parts.actuator;
        if !actuator.is_ready() {
            warn!("Motor not initialised; run_motor ignored");
            return false;
        }
        let ok = actuator.run(&FeedCommand::clamped(duty_cycle, period_ms, duration_ms, true));
        actuator.stop();
        ok
    }

    // ── Analog ────────────────────────────────────────────────

    /// On-demand pH sample.  The status is updated through the sample
    /// relay like any other sample.
    pub fn read_ph(&self) -> Result<Sample> {
        let sample = self.parts.sampler.read_sample();
        match &sample {
            Ok(s) => info!("pH reading: {:.2} ({:.4} V, raw {})", s.derived_value, s.voltage, s.raw_code),
            Err(e) => warn!("pH reading failed: {}", e),
        }
        sample
    }

    pub fn init_analog_sensor(&self) -> bool {
        let ok = self.parts.sampler.initialize();
        info!("Analog channel initialisation {}", if ok { "succeeded" } else { "failed" });
        ok
    }

    // ── Component notifications ───────────────────────────────

    pub fn on_motion(&self, _event: &MotionEvent) {
        let capture_requested = self.status.auto_mode();
        if capture_requested {
            self.parts.camera.capture_image();
        } else {
            debug!("Motion ignored: auto mode disabled");
        }
        self.sink.emit(&AppEvent::MotionDetected { capture_requested });
    }

    /// Runs on the capture thread.  A positive frame in auto-mode feeds
    /// before returning.
    pub fn on_classification(&self, classification: Classification) {
        let positive = classification.positive;
        self.status.set_fish_detected(positive);
        info!(
            "Frame classified: {} ({} regions)",
            if positive { "fish" } else { "no fish" },
            classification.regions.len()
        );
        self.sink.emit(&AppEvent::FrameClassified {
            positive,
            regions: classification.regions.len(),
        });

        if let Some(archive) = &self.parts.archive {
            match archive.store(&classification.annotated, positive) {
                Ok(Some(path)) if positive => self.status.set_last_image(&path),
                Ok(_) => {}
                Err(e) => warn!("Archiving frame failed: {}", e),
            }
        }

        if positive && self.status.auto_mode() {
            let _ = self.feed_fish(false);
        }
    }

    pub fn on_sample(&self, sample: &Sample) {
        self.status.set_sample(*sample);
        self.sink.emit(&AppEvent::SampleUpdated(*sample));
    }

    // ── Status ────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot(ComponentHealth {
            motor_ready: self.parts.actuator.is_ready(),
            analog_ready: self.parts.sampler.is_ready(),
            motion_healthy: self.parts.motion.is_healthy(),
            camera_healthy: self.parts.camera.is_healthy(),
        })
    }

    pub fn system_status(&self) -> &SystemStatus {
        &self.status
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn execute(&self, command: AppCommand) -> CommandReply {
        debug!("Executing {:?}", command);
        match command {
            AppCommand::RunMotor {
                duty_cycle,
                duration,
                period,
            } => {
                if self.run_motor(duty_cycle, duration, period) {
                    CommandReply::Accepted
                } else if self.parts.actuator.is_ready() {
                    CommandReply::Rejected("motor run failed".into())
                } else {
                    CommandReply::Rejected(SkipReason::ActuatorNotReady.to_string())
                }
            }
            AppCommand::FeedFish { override_detection } => match self.feed_fish(override_detection) {
                FeedOutcome::Fed { .. } => CommandReply::Accepted,
                FeedOutcome::Skipped(reason) => CommandReply::Rejected(reason.to_string()),
            },
            AppCommand::ReadPh => match self.read_ph() {
                Ok(_) => CommandReply::Accepted,
                Err(e) => CommandReply::Rejected(e.to_string()),
            },
            AppCommand::InitAnalogSensor => {
                if self.init_analog_sensor() {
                    CommandReply::Accepted
                } else {
                    CommandReply::Rejected("analog channel unavailable".into())
                }
            }
            AppCommand::SetAutoMode { enabled } => {
                self.set_auto_mode(enabled);
                CommandReply::Accepted
            }
        }
    }
}

impl RequestHandler for FeedController {
    fn status_json(&self) -> String {
        self.status().to_json()
    }

    fn handle_command(&self, body: &str) -> CommandReply {
        match parse_command(body) {
            Ok(command) => self.execute(command),
            Err(e) => {
                warn!("Dropping request: {}", e);
                CommandReply::Rejected(e.to_string())
            }
        }
    }
}
