//! In-memory hardware for host runs and tests.
//!
//! | Type              | Stands in for                  |
//! |-------------------|--------------------------------|
//! | `SimOutputPin`    | motor output line              |
//! | `SimEdgeSource`   | PIR input line (edge events)   |
//! | `SimAdc`          | ADS1115 on the I2C bus         |
//! | `SimBusOpener`    | `/dev/i2c-N` open              |
//! | `SyntheticCamera` | `libcamera-still`              |
//!
//! Every handle is cheaply cloneable and shares state with its clones, so a
//! test keeps one copy for inspection and hands the other to the component.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::{self, I2c, Operation};

use crate::app::events::{Edge, MotionEvent};
use crate::app::ports::{AnalogBusOpener, EdgeSource, StillImageSource};
use crate::error::{HardwareInitError, IoError, Result};
use crate::vision::Frame;

// ── Output line ───────────────────────────────────────────────

/// Writes kept per pin; older ones are dropped first.
pub const PIN_HISTORY_CAP: usize = 8_192;

#[derive(Debug, Default)]
struct PinState {
    high: bool,
    fail: bool,
    /// Most recent successful writes: (level, when).
    history: VecDeque<(bool, Instant)>,
}

/// Output pin that records its level changes.
#[derive(Debug, Clone, Default)]
pub struct SimOutputPin {
    state: Arc<Mutex<PinState>>,
}

impl SimOutputPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.lock().high
    }

    pub fn history(&self) -> Vec<(bool, Instant)> {
        self.lock().history.iter().copied().collect()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Make every following write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail = fail;
    }

    fn write(&self, high: bool) -> core::result::Result<(), digital::ErrorKind> {
        let mut s = self.lock();
        if s.fail {
            return Err(digital::ErrorKind::Other);
        }
        s.high = high;
        if s.history.len() == PIN_HISTORY_CAP {
            s.history.pop_front();
        }
        s.history.push_back((high, Instant::now()));
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PinState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl digital::ErrorType for SimOutputPin {
    type Error = digital::ErrorKind;
}

impl OutputPin for SimOutputPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.write(true)
    }
}

// ── Edge input line ───────────────────────────────────────────

type EdgeMessage = core::result::Result<Edge, String>;

/// Input line fed by an [`EdgeInjector`].  Blocks in `recv_timeout`, so an
/// idle sensor costs nothing and still honours the wait timeout.
pub struct SimEdgeSource {
    rx: Receiver<EdgeMessage>,
}

/// Sending half of a [`SimEdgeSource`].
#[derive(Debug, Clone)]
pub struct EdgeInjector {
    tx: Sender<EdgeMessage>,
}

impl SimEdgeSource {
    pub fn new() -> (Self, EdgeInjector) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, EdgeInjector { tx })
    }
}

impl EdgeInjector {
    pub fn rising(&self) {
        let _ = self.tx.send(Ok(Edge::Rising));
    }

    pub fn falling(&self) {
        let _ = self.tx.send(Ok(Edge::Falling));
    }

    /// A full pulse: rising then falling.
    pub fn pulse(&self) {
        self.rising();
        self.falling();
    }

    /// Make the next wait fail as if the line had gone away.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(reason.to_owned()));
    }
}

impl EdgeSource for SimEdgeSource {
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<Option<MotionEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(edge)) => Ok(Some(MotionEvent::now(edge))),
            Ok(Err(reason)) => Err(IoError::EdgeWait(reason).into()),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(IoError::EdgeWait("edge injector dropped".into()).into())
            }
        }
    }
}

// ── ADC on the I2C bus ────────────────────────────────────────

#[derive(Debug, Default)]
struct AdcState {
    code: i16,
    fail_reads: bool,
    /// Every write transaction, in order.
    writes: Vec<Vec<u8>>,
    reads: usize,
}

/// ADS1115 double: records register writes and returns a fixed code.
#[derive(Debug, Clone, Default)]
pub struct SimAdc {
    state: Arc<Mutex<AdcState>>,
}

impl SimAdc {
    pub fn with_code(code: i16) -> Self {
        let adc = Self::default();
        adc.set_code(code);
        adc
    }

    pub fn set_code(&self, code: i16) {
        self.lock().code = code;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AdcState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl i2c::ErrorType for SimAdc {
    type Error = i2c::ErrorKind;
}

impl I2c for SimAdc {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> core::result::Result<(), Self::Error> {
        let mut s = self.lock();
        for op in operations {
            match op {
                Operation::Write(bytes) => s.writes.push(bytes.to_vec()),
                Operation::Read(buf) => {
                    if s.fail_reads {
                        return Err(i2c::ErrorKind::Other);
                    }
                    s.reads += 1;
                    let be = s.code.to_be_bytes();
                    for (dst, src) in buf.iter_mut().zip(be.iter()) {
                        *dst = *src;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Hands out clones of one [`SimAdc`]; can be told to fail like a missing
/// `/dev/i2c-N`.
#[derive(Debug, Clone, Default)]
pub struct SimBusOpener {
    adc: SimAdc,
    fail_open: Arc<AtomicBool>,
}

impl SimBusOpener {
    pub fn new(adc: SimAdc) -> Self {
        Self {
            adc,
            fail_open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing() -> Self {
        let opener = Self::new(SimAdc::default());
        opener.fail_opens(true);
        opener
    }

    /// Make later opens fail (bus missing) or succeed (bus plugged in).
    pub fn fail_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Release);
    }
}

impl AnalogBusOpener for SimBusOpener {
    type Bus = SimAdc;

    fn open(&self) -> Result<SimAdc> {
        if self.fail_open.load(Ordering::Acquire) {
            return Err(HardwareInitError::BusOpen("sim".into()).into());
        }
        Ok(self.adc.clone())
    }
}

// ── Camera ────────────────────────────────────────────────────

/// Writes a fixed scene as JPEG.  The scene keeps its own dimensions
/// whatever resolution is requested.
pub struct SyntheticCamera {
    scene: Frame,
}

impl SyntheticCamera {
    pub fn new(scene: Frame) -> Self {
        Self { scene }
    }
}

impl StillImageSource for SyntheticCamera {
    fn acquire(&mut self, path: &Path, _width: u32, _height: u32, quality: u8) -> Result<()> {
        let jpeg = self.scene.encode_jpeg(quality)?;
        std::fs::write(path, jpeg).map_err(|err| IoError::Capture(err.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_records_levels() {
        let mut pin = SimOutputPin::new();
        let observer = pin.clone();
        pin.set_high().unwrap();
        pin.set_low().unwrap();
        let levels: Vec<bool> = observer.history().into_iter().map(|(h, _)| h).collect();
        assert_eq!(levels, vec![true, false]);
    }

    #[test]
    fn pin_history_keeps_only_the_latest_writes() {
        let mut pin = SimOutputPin::new();
        for _ in 0..PIN_HISTORY_CAP {
            pin.set_low().unwrap();
        }
        pin.set_high().unwrap();
        let history = pin.history();
        assert_eq!(history.len(), PIN_HISTORY_CAP);
        assert!(history.last().unwrap().0);
        assert!(!history.first().unwrap().0);
    }

    #[test]
    fn edge_source_times_out_then_delivers() {
        let (mut src, inject) = SimEdgeSource::new();
        assert!(src.wait_for_edge(Duration::from_millis(10)).unwrap().is_none());
        inject.rising();
        let ev = src.wait_for_edge(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(ev.edge, Edge::Rising);
    }

    #[test]
    fn edge_source_errors_when_injector_dropped() {
        let (mut src, inject) = SimEdgeSource::new();
        drop(inject);
        assert!(src.wait_for_edge(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn adc_returns_code_big_endian() {
        let mut adc = SimAdc::with_code(0x1234);
        let mut buf = [0u8; 2];
        adc.write(0x48, &[0x00]).unwrap();
        adc.read(0x48, &mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34]);
        assert_eq!(adc.writes(), vec![vec![0x00]]);
    }
}
