//! pH probe behind an ADS1115 16-bit ADC on I2C.
//!
//! One conversion cycle:
//!
//! | Step | Bytes on the bus               | Meaning                         |
//! |------|--------------------------------|---------------------------------|
//! | 1    | `01 hi lo`                     | write config, start single-shot |
//! | 2    | (wait `settle_ms`)             | conversion time                 |
//! | 3    | `00`                           | point at the conversion reg     |
//! | 4    | read 2 bytes, big-endian `i16` | raw code                        |
//!
//! `volts = raw * reference / 32767`, `pH = slope * volts + offset`.
//!
//! The bus is opened lazily on first use.  Access is serialized by a mutex
//! so a read from the request thread and the periodic worker never
//! interleave register writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::adapters::time::HostDelay;
use crate::app::events::Sample;
use crate::app::ports::{AnalogBusOpener, SampleHandler, SampleSource, Worker};
use crate::config::AnalogConfig;
use crate::error::{Error, HardwareInitError, IoError, Result};
use crate::worker::{FaultGuard, SMALL_STACK_KB, WorkerSlot, spawn_worker};

const WORKER_NAME: &str = "analog";

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Programmable gain: the full-scale range of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    Fs6_144,
    Fs4_096,
    Fs2_048,
    Fs1_024,
    Fs0_512,
    Fs0_256,
}

impl Gain {
    const ALL: [Gain; 6] = [
        Gain::Fs6_144,
        Gain::Fs4_096,
        Gain::Fs2_048,
        Gain::Fs1_024,
        Gain::Fs0_512,
        Gain::Fs0_256,
    ];

    /// The gain whose full scale equals `volts`, if any.
    pub fn from_reference(volts: f32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|g| (g.full_scale() - volts).abs() < 1e-3)
    }

    pub fn full_scale(self) -> f32 {
        match self {
            Self::Fs6_144 => 6.144,
            Self::Fs4_096 => 4.096,
            Self::Fs2_048 => 2.048,
            Self::Fs1_024 => 1.024,
            Self::Fs0_512 => 0.512,
            Self::Fs0_256 => 0.256,
        }
    }

    /// PGA field, bits 11:9 of the config register.
    pub fn pga_bits(self) -> u16 {
        match self {
            Self::Fs6_144 => 0b000,
            Self::Fs4_096 => 0b001,
            Self::Fs2_048 => 0b010,
            Self::Fs1_024 => 0b011,
            Self::Fs0_512 => 0b100,
            Self::Fs0_256 => 0b101,
        }
    }
}

/// Config register for a single-shot conversion of AIN0 against GND at
/// 128 SPS, comparator disabled.
pub fn config_word(gain: Gain) -> u16 {
    const START: u16 = 1 << 15;
    const MUX_AIN0_GND: u16 = 0b100 << 12;
    const SINGLE_SHOT: u16 = 1 << 8;
    const RATE_128SPS: u16 = 0b100 << 5;
    const COMPARATOR_OFF: u16 = 0b11;
    START | MUX_AIN0_GND | (gain.pga_bits() << 9) | SINGLE_SHOT | RATE_128SPS | COMPARATOR_OFF
}

pub fn code_to_volts(raw: i16, reference_volts: f32) -> f32 {
    f32::from(raw) * reference_volts / 32767.0
}

/// Linear probe calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub slope: f32,
    pub offset: f32,
}

impl Calibration {
    pub fn apply(&self, volts: f32) -> f32 {
        self.slope * volts + self.offset
    }
}

// ── Channel (bus + delay, behind one lock) ────────────────────

struct Channel<B, D> {
    bus: Option<B>,
    delay: D,
}

struct Core<O: AnalogBusOpener, D> {
    opener: O,
    address: u8,
    gain: Gain,
    settle_ms: u32,
    calibration: Calibration,
    channel: Mutex<Channel<O::Bus, D>>,
    ready: AtomicBool,
    healthy: AtomicBool,
}

impl<O: AnalogBusOpener, D: DelayNs> Core<O, D> {
    fn lock(&self) -> MutexGuard<'_, Channel<O::Bus, D>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize(&self) -> bool {
        let mut channel = self.lock();
        if channel.bus.is_some() {
            return true;
        }
        match self.opener.open() {
            Ok(bus) => {
                channel.bus = Some(bus);
                self.ready.store(true, Ordering::Release);
                self.healthy.store(true, Ordering::Release);
                info!("Analog channel ready (addr=0x{:02x}, gain={:?})", self.address, self.gain);
                true
            }
            Err(e) => {
                self.healthy.store(false, Ordering::Release);
                warn!("Analog channel unavailable: {}", e);
                false
            }
        }
    }

    fn cleanup(&self) {
        let mut channel = self.lock();
        if channel.bus.take().is_some() {
            info!("Analog channel released");
        }
        self.ready.store(false, Ordering::Release);
    }

    /// One conversion.  The channel lock is dropped before returning.
    fn convert(&self) -> Result<Sample> {
        if !self.ready.load(Ordering::Acquire) && !self.initialize() {
            return Err(HardwareInitError::Unavailable("analog channel").into());
        }
        let mut guard = self.lock();
        let Channel { bus, delay } = &mut *guard;
        let Some(bus) = bus.as_mut() else {
            return Err(HardwareInitError::Unavailable("analog channel").into());
        };

        let [hi, lo] = config_word(self.gain).to_be_bytes();
        bus.write(self.address, &[REG_CONFIG, hi, lo])
            .map_err(|_| IoError::BusWrite)?;
        delay.delay_ms(self.settle_ms);
        bus.write(self.address, &[REG_CONVERSION])
            .map_err(|_| IoError::BusWrite)?;
        let mut buf = [0u8; 2];
        bus.read(self.address, &mut buf)
            .map_err(|_| IoError::BusRead)?;
        drop(guard);

        let raw_code = i16::from_be_bytes(buf);
        let voltage = code_to_volts(raw_code, self.gain.full_scale());
        let derived_value = self.calibration.apply(voltage);
        debug!("Analog: raw={} volts={:.4} pH={:.2}", raw_code, voltage, derived_value);
        Ok(Sample {
            raw_code,
            voltage,
            derived_value,
            timestamp: SystemTime::now(),
        })
    }
}

fn notify(handlers: &[Arc<dyn SampleHandler>], sample: &Sample) {
    for handler in handlers {
        handler.on_sample(sample);
    }
}

// ── Periodic worker pacing ────────────────────────────────────

struct Pacing {
    running: Mutex<bool>,
    wake: Condvar,
}

impl Pacing {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AnalogSampler<O: AnalogBusOpener, D = HostDelay> {
    core: Arc<Core<O, D>>,
    handlers: Vec<Arc<dyn SampleHandler>>,
    /// `Some` when the periodic worker is enabled.
    interval: Option<Duration>,
    pacing: Arc<Pacing>,
    slot: Mutex<WorkerSlot<()>>,
}

impl<O, D> AnalogSampler<O, D>
where
    O: AnalogBusOpener,
    D: DelayNs + Send + 'static,
{
    pub fn new(opener: O, delay: D, config: &AnalogConfig) -> Result<Self> {
        let gain = Gain::from_reference(config.reference_volts)
            .ok_or(Error::Config("analog.reference_volts"))?;
        Ok(Self {
            core: Arc::new(Core {
                opener,
                address: config.address,
                gain,
                settle_ms: config.settle_ms,
                calibration: Calibration {
                    slope: config.slope,
                    offset: config.offset,
                },
                channel: Mutex::new(Channel { bus: None, delay }),
                ready: AtomicBool::new(false),
                healthy: AtomicBool::new(true),
            }),
            handlers: Vec::new(),
            interval: config
                .periodic
                .then(|| Duration::from_millis(config.sample_interval_ms)),
            pacing: Arc::new(Pacing {
                running: Mutex::new(false),
                wake: Condvar::new(),
            }),
            slot: Mutex::new(WorkerSlot::Idle(())),
        })
    }

    pub fn register_callback(&mut self, handler: Arc<dyn SampleHandler>) {
        self.handlers.push(handler);
    }
}

impl<O, D> Worker for AnalogSampler<O, D>
where
    O: AnalogBusOpener,
    D: DelayNs + Send + 'static,
{
    fn name(&self) -> &'static str {
        WORKER_NAME
    }

    /// Opens the channel; spawns the sampling loop only when periodic
    /// sampling is configured.  The loop is spawned even if the channel is
    /// missing, since every conversion retries the open.
    fn start(&self) -> Result<()> {
        let opened = self.core.initialize();
        let Some(interval) = self.interval else {
            return if opened {
                Ok(())
            } else {
                Err(HardwareInitError::Unavailable("analog channel").into())
            };
        };
        if !opened {
            warn!("Analog channel missing; periodic sampling will retry the open");
        }

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.has_handle() {
            if *self.pacing.lock() {
                return Ok(());
            }
            slot.reap(WORKER_NAME);
        }
        if slot.take_idle().is_none() {
            return Err(Error::ThreadFault(WORKER_NAME));
        }

        *self.pacing.lock() = true;
        let core = Arc::clone(&self.core);
        let pacing = Arc::clone(&self.pacing);
        let handlers: Arc<[Arc<dyn SampleHandler>]> = self.handlers.clone().into();
        match spawn_worker(WORKER_NAME, SMALL_STACK_KB, move || {
            sample_loop(&core, &pacing, &handlers, interval);
        }) {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                Ok(())
            }
            Err(e) => {
                *self.pacing.lock() = false;
                *slot = WorkerSlot::Idle(());
                Err(e)
            }
        }
    }

    fn stop(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *self.pacing.lock() = false;
        self.pacing.wake.notify_all();
        slot.reap(WORKER_NAME);
    }

    fn is_running(&self) -> bool {
        *self.pacing.lock()
    }

    fn is_healthy(&self) -> bool {
        self.core.healthy.load(Ordering::Acquire)
    }
}

impl<O, D> SampleSource for AnalogSampler<O, D>
where
    O: AnalogBusOpener,
    D: DelayNs + Send + 'static,
{
    fn initialize(&self) -> bool {
        self.core.initialize()
    }

    fn cleanup(&self) {
        self.core.cleanup();
    }

    fn read_sample(&self) -> Result<Sample> {
        let sample = self.core.convert()?;
        notify(&self.handlers, &sample);
        Ok(sample)
    }

    fn is_ready(&self) -> bool {
        self.core.ready.load(Ordering::Acquire)
    }
}

impl<O: AnalogBusOpener, D> Drop for AnalogSampler<O, D> {
    fn drop(&mut self) {
        *self.pacing.lock() = false;
        self.pacing.wake.notify_all();
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        slot.reap(WORKER_NAME);
    }
}

fn sample_loop<O, D>(
    core: &Core<O, D>,
    pacing: &Pacing,
    handlers: &[Arc<dyn SampleHandler>],
    interval: Duration,
) where
    O: AnalogBusOpener,
    D: DelayNs,
{
    let _guard = FaultGuard::new(WORKER_NAME, || {
        *pacing.lock() = false;
        core.healthy.store(false, Ordering::Release);
    });
    info!("Analog sampling every {} ms", interval.as_millis());
    loop {
        if !*pacing.lock() {
            break;
        }
        match core.convert() {
            Ok(sample) => notify(handlers, &sample),
            Err(e) => warn!("Analog sample failed: {}", e),
        }
        let running = pacing.lock();
        let (running, _) = pacing
            .wake
            .wait_timeout_while(running, interval, |running| *running)
            .unwrap_or_else(PoisonError::into_inner);
        if !*running {
            break;
        }
    }
    info!("Analog sampling stopped");
}
