//! System configuration parameters
//!
//! All tunable parameters for the feeder, grouped by component.  Constructed
//! once at startup (defaults, optionally overridden by a JSON file through
//! [`ConfigStore`](crate::app::ports::ConfigStore)) and handed to each
//! component by reference.  Every section is `#[serde(default)]`, so a file
//! only needs to name the values it changes.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::pins;
use crate::sensors::analog::Gain;

/// Maximum number of steps in a feed sequence.
pub const MAX_FEED_STEPS: usize = 4;

/// Core system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub gpio: GpioConfig,
    pub analog: AnalogConfig,
    pub camera: CameraConfig,
    pub classifier: ClassifierConfig,
    pub feed: FeedConfig,
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
}

// ── GPIO ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// GPIO character device path.
    pub chip_path: String,
    /// Output line driving the feed motor.
    pub motor_line: u32,
    /// Input line connected to the PIR sensor.
    pub motion_line: u32,
    /// Upper bound on one edge wait; also bounds how long `stop()` takes.
    pub edge_wait_timeout_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip_path: pins::GPIO_CHIP_PATH.into(),
            motor_line: pins::MOTOR_LINE,
            motion_line: pins::MOTION_LINE,
            edge_wait_timeout_ms: 5_000,
        }
    }
}

// ── Analog (pH) ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogConfig {
    pub bus_path: String,
    pub address: u8,
    /// Full-scale reference in volts; must match one of the ADC gain steps.
    pub reference_volts: f32,
    /// pH per volt.
    pub slope: f32,
    /// pH at 0 V.
    pub offset: f32,
    /// Wait between starting a conversion and reading the result.
    pub settle_ms: u32,
    /// Run the periodic sampling worker.
    pub periodic: bool,
    pub sample_interval_ms: u64,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            bus_path: pins::I2C_BUS_PATH.into(),
            address: pins::ADC_I2C_ADDRESS,
            reference_volts: 4.096,
            slope: -5.70,
            offset: 21.34,
            settle_ms: 10,
            periodic: false,
            sample_interval_ms: 1_000,
        }
    }
}

// ── Camera ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Still capture program (`libcamera-still` or `rpicam-still`).
    pub command: String,
    /// Where each capture is written before decoding.
    pub output_path: String,
    pub width: u32,
    pub height: u32,
    /// JPEG quality passed to the capture program (1–100).
    pub quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: "libcamera-still".into(),
            output_path: "fish_detection.jpg".into(),
            width: 640,
            height: 480,
            quality: 85,
        }
    }
}

// ── Classifier ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of qualifying regions that make a frame positive.
    pub min_positive_regions: u32,
    /// Regions at or below this pixel count are noise.
    pub min_region_area: u32,
    /// Bounding-box width / height band.
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Region pixels / bounding-box pixels.
    pub min_fill_ratio: f32,
    /// Hue distance from pure red (degrees) still counted as red.
    pub hue_tolerance_deg: f32,
    pub min_saturation: u8,
    pub min_value: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_positive_regions: 1,
            min_region_area: 100,
            min_aspect_ratio: 1.0,
            max_aspect_ratio: 5.0,
            min_fill_ratio: 0.3,
            hue_tolerance_deg: 20.0,
            min_saturation: 100,
            min_value: 100,
        }
    }
}

// ── Feed sequence ─────────────────────────────────────────────

/// One PWM phase of a feed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStep {
    pub duty_cycle_percent: u8,
    pub period_ms: u32,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Phases run in order, followed by an explicit stop.
    pub sequence: heapless::Vec<FeedStep, MAX_FEED_STEPS>,
    /// Auto-mode state at startup.
    pub auto_mode_at_startup: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            sequence: [
                FeedStep {
                    duty_cycle_percent: 100,
                    period_ms: 10,
                    duration_ms: 3_000,
                },
                FeedStep {
                    duty_cycle_percent: 50,
                    period_ms: 10,
                    duration_ms: 500,
                },
            ]
            .into_iter()
            .collect(),
            auto_mode_at_startup: true,
        }
    }
}

// ── Request server ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Time a client gets to send its request head.
    pub read_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            read_timeout_ms: 2_000,
        }
    }
}

// ── Archive ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub directory: String,
    /// Remove everything in `directory` at startup.
    pub clear_on_startup: bool,
    /// Also archive frames classified negative.
    pub keep_negatives: bool,
    pub jpeg_quality: u8,
    /// Copy of the most recent positive frame, reported as `last_image`.
    pub last_detection_path: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            directory: "archive".into(),
            clear_on_startup: true,
            keep_negatives: false,
            jpeg_quality: 90,
            last_detection_path: "last_detected_image.jpg".into(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────

impl SystemConfig {
    /// Reject values no component can operate with.
    ///
    /// Feed step values outside the safe band are accepted here and clamped
    /// at run time, the same way command parameters are.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gpio.edge_wait_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "gpio.edge_wait_timeout_ms must be > 0",
            ));
        }
        if Gain::from_reference(self.analog.reference_volts).is_none() {
            return Err(ConfigError::ValidationFailed(
                "analog.reference_volts must be one of 6.144/4.096/2.048/1.024/0.512/0.256",
            ));
        }
        if !self.analog.slope.is_finite() || !self.analog.offset.is_finite() {
            return Err(ConfigError::ValidationFailed(
                "analog calibration must be finite",
            ));
        }
        if self.analog.sample_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "analog.sample_interval_ms must be > 0",
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::ValidationFailed(
                "camera resolution must be non-zero",
            ));
        }
        if !(1..=100).contains(&self.camera.quality) || !(1..=100).contains(&self.archive.jpeg_quality) {
            return Err(ConfigError::ValidationFailed("JPEG quality must be 1-100"));
        }
        if self.classifier.min_positive_regions == 0 {
            return Err(ConfigError::ValidationFailed(
                "classifier.min_positive_regions must be >= 1",
            ));
        }
        if self.classifier.min_aspect_ratio > self.classifier.max_aspect_ratio {
            return Err(ConfigError::ValidationFailed(
                "classifier aspect band is inverted",
            ));
        }
        if self.feed.sequence.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "feed.sequence must have at least one step",
            ));
        }
        Ok(())
    }
}
