//! Linux hardware backends (feature `linux`).
//!
//! | Function / type       | Opens                           | Used by            |
//! |-----------------------|---------------------------------|--------------------|
//! | `open_output_line`    | GPIO chardev line, output, LOW  | `ActuatorDriver`   |
//! | `CdevEdgeSource`      | GPIO chardev line, both edges   | `DigitalEventSensor` |
//! | `I2cBusOpener`        | `/dev/i2c-N`                    | `AnalogSampler`    |
//!
//! Lines and the bus are released when their handles drop.

use std::os::fd::AsRawFd;
use std::time::Duration;

use gpio_cdev::{Chip, EventRequestFlags, EventType, LineEventHandle, LineRequestFlags};
use linux_embedded_hal::{CdevPin, I2cdev};
use log::info;

use crate::app::events::{Edge, MotionEvent};
use crate::app::ports::{AnalogBusOpener, EdgeSource};
use crate::error::{HardwareInitError, IoError, Result};
use crate::pins::LINE_CONSUMER;

fn open_chip(chip_path: &str) -> Result<Chip> {
    Chip::new(chip_path)
        .map_err(|e| HardwareInitError::ChipOpen(format!("{chip_path}: {e}")).into())
}

/// Request `offset` as an output, initially LOW.
pub fn open_output_line(chip_path: &str, offset: u32) -> Result<CdevPin> {
    let mut chip = open_chip(chip_path)?;
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(LineRequestFlags::OUTPUT, 0, LINE_CONSUMER))
        .map_err(|_| HardwareInitError::LineRequest(offset))?;
    let pin = CdevPin::new(handle).map_err(|_| HardwareInitError::LineRequest(offset))?;
    info!("GPIO {} requested as output", offset);
    Ok(pin)
}

/// Input line delivering rising and falling edge events.
pub struct CdevEdgeSource {
    events: LineEventHandle,
}

impl CdevEdgeSource {
    pub fn open(chip_path: &str, offset: u32) -> Result<Self> {
        let mut chip = open_chip(chip_path)?;
        let events = chip
            .get_line(offset)
            .and_then(|line| {
                line.events(
                    LineRequestFlags::INPUT,
                    EventRequestFlags::BOTH_EDGES,
                    LINE_CONSUMER,
                )
            })
            .map_err(|_| HardwareInitError::LineRequest(offset))?;
        info!("GPIO {} requested for edge events", offset);
        Ok(Self { events })
    }
}

impl EdgeSource for CdevEdgeSource {
    fn wait_for_edge(&mut self, timeout: Duration) -> Result<Option<MotionEvent>> {
        let mut pfd = libc::pollfd {
            fd: self.events.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: `pfd` is a valid, initialised pollfd that outlives the
        // call, and nfds is 1, matching the single entry passed.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(IoError::EdgeWait(err.to_string()).into());
        }
        if rc == 0 {
            return Ok(None);
        }

        let event = self
            .events
            .get_event()
            .map_err(|e| IoError::EdgeWait(e.to_string()))?;
        let edge = match event.event_type() {
            EventType::RisingEdge => Edge::Rising,
            EventType::FallingEdge => Edge::Falling,
        };
        Ok(Some(MotionEvent::now(edge)))
    }
}

/// Opens the I2C character device on first use.
#[derive(Debug, Clone)]
pub struct I2cBusOpener {
    path: String,
}

impl I2cBusOpener {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl AnalogBusOpener for I2cBusOpener {
    type Bus = I2cdev;

    fn open(&self) -> Result<I2cdev> {
        I2cdev::new(&self.path)
            .map_err(|e| HardwareInitError::BusOpen(format!("{}: {e}", self.path)).into())
    }
}
