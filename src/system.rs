//! System assembly.
//!
//! Turns a [`SystemConfig`] plus a set of opened hardware handles into a
//! wired [`FeedController`]:
//!
//! ```text
//!   Hardware { motor, motion, analog, camera }
//!        │
//!        ├─ ActuatorDriver ◀─ motor pin
//!        ├─ DigitalEventSensor ◀─ motion line ──▶ motion relay
//!        ├─ ImageCapturer ◀─ still source ──▶ classifying relay
//!        ├─ AnalogSampler ◀─ bus opener ──▶ sample relay
//!        └─ FsArchive
//!                        ▼
//!                 FeedController (relays bound here)
//! ```
//!
//! Two hardware sets exist: the GPIO/I2C/libcamera one (feature `linux`)
//! and a simulated one for host runs, driven from stdin.

use std::sync::Arc;
use std::time::Duration;

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::adapters::archive::FsArchive;
use crate::adapters::sim::{
    EdgeInjector, SimAdc, SimBusOpener, SimEdgeSource, SimOutputPin, SyntheticCamera,
};
use crate::adapters::time::HostDelay;
use crate::app::ports::{AnalogBusOpener, EdgeSource, EventSink, FrameStore, StillImageSource};
use crate::app::service::{Collaborators, ControllerLink, FeedController};
use crate::config::SystemConfig;
use crate::drivers::actuator::ActuatorDriver;
use crate::error::Result;
use crate::sensors::analog::AnalogSampler;
use crate::sensors::camera::{CaptureSettings, ImageCapturer};
use crate::sensors::motion::DigitalEventSensor;
use crate::vision::{ColorRegionClassifier, Frame, ImageFileDecoder};

/// Opened (or failed) hardware handles.  A failed line leaves its
/// component degraded; the rest of the system still comes up.
pub struct Hardware<P, E, O, S> {
    pub motor: Result<P>,
    pub motion: Result<E>,
    pub analog: O,
    pub camera: S,
}

/// Build every component, register the relays, and bind the controller.
pub fn assemble<P, E, O, S>(
    config: &SystemConfig,
    hardware: Hardware<P, E, O, S>,
    sink: Arc<dyn EventSink>,
) -> Result<Arc<FeedController>>
where
    P: OutputPin + Send + 'static,
    E: EdgeSource,
    O: AnalogBusOpener,
    S: StillImageSource,
{
    let link = ControllerLink::new();

    let actuator = ActuatorDriver::new(hardware.motor, HostDelay);

    let mut motion = DigitalEventSensor::new(
        hardware.motion,
        Duration::from_millis(config.gpio.edge_wait_timeout_ms),
    );
    motion.register_callback(link.motion_relay());

    let classifier = Arc::new(ColorRegionClassifier::new(config.classifier.clone()));
    let mut camera = ImageCapturer::new(
        hardware.camera,
        ImageFileDecoder,
        CaptureSettings::from(&config.camera),
    );
    camera.register_callback(link.classifying_relay(classifier));

    let mut sampler = AnalogSampler::new(hardware.analog, HostDelay, &config.analog)?;
    sampler.register_callback(link.sample_relay());

    let archive = FsArchive::new(&config.archive);
    if let Err(e) = archive.reset() {
        warn!("Archive reset failed: {}", e);
    }

    let parts = Collaborators {
        actuator: Arc::new(actuator),
        sampler: Arc::new(sampler),
        motion: Arc::new(motion),
        camera: Arc::new(camera),
        archive: Some(Arc::new(archive) as Arc<dyn FrameStore>),
    };
    Ok(FeedController::new(config, parts, sink, &link))
}

// ── Linux hardware ────────────────────────────────────────────

#[cfg(feature = "linux")]
pub type LinuxHardware = Hardware<
    linux_embedded_hal::CdevPin,
    crate::adapters::linux::CdevEdgeSource,
    crate::adapters::linux::I2cBusOpener,
    crate::adapters::still_camera::LibcameraStill,
>;

/// Request the GPIO lines and prepare the bus opener and camera command.
#[cfg(feature = "linux")]
pub fn linux_hardware(config: &SystemConfig) -> LinuxHardware {
    use crate::adapters::linux::{CdevEdgeSource, I2cBusOpener, open_output_line};
    use crate::adapters::still_camera::LibcameraStill;

    Hardware {
        motor: open_output_line(&config.gpio.chip_path, config.gpio.motor_line),
        motion: CdevEdgeSource::open(&config.gpio.chip_path, config.gpio.motion_line),
        analog: I2cBusOpener::new(config.analog.bus_path.clone()),
        camera: LibcameraStill::new(config.camera.command.clone()),
    }
}

// ── Simulated hardware ────────────────────────────────────────

pub type SimHardware = Hardware<SimOutputPin, SimEdgeSource, SimBusOpener, SyntheticCamera>;

/// Handles a host run keeps to drive and observe the simulated devices.
pub struct SimControls {
    pub motion: EdgeInjector,
    pub adc: SimAdc,
    pub motor: SimOutputPin,
}

/// A blue tank with one red, fish-sized blob in it.
pub fn fish_scene(width: u32, height: u32) -> Frame {
    let mut scene = Frame::filled(width, height, [20, 40, 120]);
    scene.fill_rect(width / 3, height / 2, (width / 5).max(20), (height / 12).max(8), [220, 20, 20]);
    scene
}

/// Simulated devices showing `scene` to the camera.  The ADC starts at
/// mid-scale (about pH 9.7 with the default calibration).
pub fn simulated_hardware(scene: Frame) -> (SimHardware, SimControls) {
    let (edges, motion) = SimEdgeSource::new();
    let adc = SimAdc::with_code(16_383);
    let motor = SimOutputPin::new();
    let hardware = Hardware {
        motor: Ok(motor.clone()),
        motion: Ok(edges),
        analog: SimBusOpener::new(adc.clone()),
        camera: SyntheticCamera::new(scene),
    };
    (hardware, SimControls { motion, adc, motor })
}
