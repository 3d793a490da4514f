//! Shared system status.
//!
//! Flags and counters are atomics so any thread can read them without
//! blocking a feed.  The fields that change together (a counter and its
//! timestamp, the latest sample) sit under one mutex, so a snapshot never
//! shows a count without its time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::Serialize;

use crate::adapters::time::{epoch_secs, format_local};

use super::events::{FeedTrigger, Sample};

const NEVER: &str = "Never";

#[derive(Debug, Default)]
struct Detail {
    last_feed_time: Option<SystemTime>,
    auto_last_feed_time: Option<SystemTime>,
    last_image: Option<PathBuf>,
    latest_sample: Option<Sample>,
}

#[derive(Debug, Default)]
pub struct SystemStatus {
    auto_mode: AtomicBool,
    fish_detected: AtomicBool,
    feed_count: AtomicU64,
    auto_feed_count: AtomicU64,
    detail: Mutex<Detail>,
}

/// Component health sampled by the controller when building a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentHealth {
    pub motor_ready: bool,
    pub analog_ready: bool,
    pub motion_healthy: bool,
    pub camera_healthy: bool,
}

impl SystemStatus {
    pub fn new(auto_mode: bool) -> Self {
        Self {
            auto_mode: AtomicBool::new(auto_mode),
            ..Self::default()
        }
    }

    fn detail(&self) -> MutexGuard<'_, Detail> {
        self.detail.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn auto_mode(&self) -> bool {
        self.auto_mode.load(Ordering::Acquire)
    }

    pub fn set_auto_mode(&self, enabled: bool) {
        self.auto_mode.store(enabled, Ordering::Release);
    }

    pub fn fish_detected(&self) -> bool {
        self.fish_detected.load(Ordering::Acquire)
    }

    pub fn set_fish_detected(&self, positive: bool) {
        self.fish_detected.store(positive, Ordering::Release);
    }

    pub fn feed_count(&self) -> u64 {
        self.feed_count.load(Ordering::Acquire)
    }

    pub fn auto_feed_count(&self) -> u64 {
        self.auto_feed_count.load(Ordering::Acquire)
    }

    /// Count one completed feed and stamp its time.  Returns the new count
    /// of that trigger's counter.
    pub fn record_feed(&self, trigger: FeedTrigger, at: SystemTime) -> u64 {
        let mut detail = self.detail();
        match trigger {
            FeedTrigger::Override => {
                detail.last_feed_time = Some(at);
                self.feed_count.fetch_add(1, Ordering::AcqRel) + 1
            }
            FeedTrigger::Automatic => {
                detail.auto_last_feed_time = Some(at);
                self.auto_feed_count.fetch_add(1, Ordering::AcqRel) + 1
            }
        }
    }

    pub fn set_last_image(&self, path: &Path) {
        self.detail().last_image = Some(path.to_path_buf());
    }

    pub fn last_image(&self) -> Option<PathBuf> {
        self.detail().last_image.clone()
    }

    pub fn set_sample(&self, sample: Sample) {
        self.detail().latest_sample = Some(sample);
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.detail().latest_sample
    }

    pub fn snapshot(&self, health: ComponentHealth) -> StatusSnapshot {
        let detail = self.detail();
        let sample = detail.latest_sample;
        StatusSnapshot {
            motor_initialized: health.motor_ready,
            ph_sensor_initialized: health.analog_ready,
            motion_sensor_healthy: health.motion_healthy,
            camera_healthy: health.camera_healthy,
            feed_count: self.feed_count(),
            auto_feed_count: self.auto_feed_count(),
            fish_detected: self.fish_detected(),
            last_image: detail
                .last_image
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            auto_mode_enabled: self.auto_mode(),
            current_time: epoch_secs(SystemTime::now()),
            last_feed_time: time_or_never(detail.last_feed_time),
            auto_last_feed_time: time_or_never(detail.auto_last_feed_time),
            current_ph: sample.map_or(0.0, |s| s.derived_value),
            current_ph_voltage: sample.map_or(0.0, |s| s.voltage),
            current_ph_adc_value: sample.map_or(0, |s| s.raw_code),
            last_ph_read_time: time_or_never(sample.map(|s| s.timestamp)),
        }
    }
}

fn time_or_never(t: Option<SystemTime>) -> String {
    t.map_or_else(|| NEVER.to_owned(), format_local)
}

/// The `data` object of the GET reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub motor_initialized: bool,
    pub ph_sensor_initialized: bool,
    pub motion_sensor_healthy: bool,
    pub camera_healthy: bool,
    pub feed_count: u64,
    pub auto_feed_count: u64,
    pub fish_detected: bool,
    pub last_image: String,
    pub auto_mode_enabled: bool,
    /// Seconds since the Unix epoch.
    pub current_time: u64,
    pub last_feed_time: String,
    pub auto_last_feed_time: String,
    pub current_ph: f32,
    pub current_ph_voltage: f32,
    pub current_ph_adc_value: i16,
    pub last_ph_read_time: String,
}

/// `{"success": true, "data": {...}}`
#[derive(Debug, Serialize)]
pub struct StatusResponse<'a> {
    pub success: bool,
    pub data: &'a StatusSnapshot,
}

impl StatusSnapshot {
    pub fn to_json(&self) -> String {
        let response = StatusResponse {
            success: true,
            data: self,
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            log::error!("Status serialization failed: {}", e);
            r#"{"success":false}"#.to_owned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn fresh_status_reports_never() {
        let s = SystemStatus::new(true);
        let snap = s.snapshot(ComponentHealth::default());
        assert_eq!(snap.last_feed_time, "Never");
        assert_eq!(snap.auto_last_feed_time, "Never");
        assert_eq!(snap.last_ph_read_time, "Never");
        assert_eq!(snap.last_image, "");
        assert!(snap.auto_mode_enabled);
        assert_eq!(snap.feed_count, 0);
    }

    #[test]
    fn record_feed_moves_only_its_counter() {
        let s = SystemStatus::new(false);
        assert_eq!(s.record_feed(FeedTrigger::Override, SystemTime::now()), 1);
        assert_eq!(s.feed_count(), 1);
        assert_eq!(s.auto_feed_count(), 0);

        assert_eq!(s.record_feed(FeedTrigger::Automatic, SystemTime::now()), 1);
        let snap = s.snapshot(ComponentHealth::default());
        assert_eq!((snap.feed_count, snap.auto_feed_count), (1, 1));
        assert_ne!(snap.last_feed_time, "Never");
        assert_ne!(snap.auto_last_feed_time, "Never");
    }

    #[test]
    fn sample_fields_follow_latest_sample() {
        let s = SystemStatus::new(true);
        s.set_sample(Sample {
            raw_code: 16383,
            voltage: 2.048,
            derived_value: 9.67,
            timestamp: SystemTime::now(),
        });
        let snap = s.snapshot(ComponentHealth::default());
        assert_eq!(snap.current_ph_adc_value, 16383);
        assert!((snap.current_ph - 9.67).abs() < 1e-4);
        assert_ne!(snap.last_ph_read_time, "Never");
    }

    #[test]
    fn json_uses_success_envelope() {
        let s = SystemStatus::new(true);
        s.set_last_image(Path::new("archive/last.jpg"));
        let health = ComponentHealth {
            motor_ready: true,
            ..ComponentHealth::default()
        };
        let v: Value = serde_json::from_str(&s.snapshot(health).to_json()).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["motor_initialized"], true);
        assert_eq!(v["data"]["ph_sensor_initialized"], false);
        assert_eq!(v["data"]["last_image"], "archive/last.jpg");
        assert!(v["data"]["current_time"].as_u64().unwrap() > 0);
    }
}
