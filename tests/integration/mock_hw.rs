//! Test rig around the simulated hardware.
//!
//! Builds a fully wired controller through `system::assemble`, with short
//! timeouts, a 100 ms feed sequence and a private scratch directory, and
//! records every event the controller emits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fishfeeder::app::events::AppEvent;
use fishfeeder::app::ports::EventSink;
use fishfeeder::app::service::FeedController;
use fishfeeder::config::{FeedStep, SystemConfig};
use fishfeeder::system::{self, Hardware, SimControls};
use fishfeeder::vision::Frame;

pub const SCENE_WIDTH: u32 = 320;
pub const SCENE_HEIGHT: u32 = 240;

// ── Event recorder ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AppEvent>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &AppEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Scratch directory ─────────────────────────────────────────

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

pub fn scratch_dir(tag: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "fishfeeder-it-{}-{}-{}",
        tag,
        std::process::id(),
        n
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Defaults tightened for tests, with every file under `dir`.
pub fn test_config(dir: &Path, auto_mode: bool) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.gpio.edge_wait_timeout_ms = 50;
    config.analog.settle_ms = 1;
    config.camera.output_path = dir.join("capture.jpg").display().to_string();
    config.camera.width = SCENE_WIDTH;
    config.camera.height = SCENE_HEIGHT;
    config.feed.sequence = [FeedStep {
        duty_cycle_percent: 100,
        period_ms: 10,
        duration_ms: 100,
    }]
    .into_iter()
    .collect();
    config.feed.auto_mode_at_startup = auto_mode;
    config.server.bind_address = "127.0.0.1:0".into();
    config.archive.directory = dir.join("archive").display().to_string();
    config.archive.last_detection_path = dir.join("last.jpg").display().to_string();
    config
}

pub fn fish_scene() -> Frame {
    system::fish_scene(SCENE_WIDTH, SCENE_HEIGHT)
}

pub fn empty_scene() -> Frame {
    Frame::filled(SCENE_WIDTH, SCENE_HEIGHT, [20, 40, 120])
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub controller: Arc<FeedController>,
    pub controls: SimControls,
    pub sink: Arc<RecordingSink>,
    pub config: SystemConfig,
    pub dir: PathBuf,
}

impl Rig {
    pub fn new(tag: &str, auto_mode: bool, scene: Frame) -> Self {
        let dir = scratch_dir(tag);
        let config = test_config(&dir, auto_mode);
        let (hardware, controls) = system::simulated_hardware(scene);
        Self::with_hardware(dir, config, hardware, controls)
    }

    pub fn with_hardware<P, E, O, S>(
        dir: PathBuf,
        config: SystemConfig,
        hardware: Hardware<P, E, O, S>,
        controls: SimControls,
    ) -> Self
    where
        P: embedded_hal::digital::OutputPin + Send + 'static,
        E: fishfeeder::app::ports::EdgeSource,
        O: fishfeeder::app::ports::AnalogBusOpener,
        S: fishfeeder::app::ports::StillImageSource,
    {
        let sink = Arc::new(RecordingSink::default());
        let controller = system::assemble(&config, hardware, sink.clone()).unwrap();
        Self {
            controller,
            controls,
            sink,
            config,
            dir,
        }
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.controller.shutdown();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
