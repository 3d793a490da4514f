//! Feed motor driver.
//!
//! Bounded software PWM on one digital output: for the wall-clock span of
//! `duration`, the line is held HIGH for `duty/100 * period` and LOW for
//! the rest of each period.  Soft timing only, adequate for a geared
//! mechanical feeder.
//!
//! ```text
//!   duty 30 %, period 10 ms
//!   ┌──┐       ┌──┐       ┌──┐
//!   │3 │  7    │  │       │  │
//! ──┘  └───────┘  └───────┘  └─────
//! ```
//!
//! ## Ownership
//!
//! The driver owns the line exclusively behind a mutex, so manual runs from
//! the request thread and automatic feeds from the capture thread are
//! serialized instead of interleaving writes.
//!
//! ## Dual-target design
//!
//! Generic over `embedded_hal::digital::OutputPin`: a GPIO character-device
//! line on Linux (`linux` feature), an in-memory pin on host/test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use crate::adapters::time::HostDelay;
use crate::app::ports::FeedActuator;
use crate::error::Result;
use crate::safety::FeedCommand;

/// HIGH/LOW split of one PWM period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmPlan {
    pub high: Duration,
    pub low: Duration,
}

impl PwmPlan {
    pub fn new(duty_cycle_percent: u8, period_ms: u32) -> Self {
        let duty = u64::from(duty_cycle_percent.min(100));
        let period_us = u64::from(period_ms) * 1_000;
        let high_us = period_us * duty / 100;
        Self {
            high: Duration::from_micros(high_us),
            low: Duration::from_micros(period_us - high_us),
        }
    }

    pub fn period(&self) -> Duration {
        self.high + self.low
    }
}

struct Line<P, D> {
    pin: P,
    delay: D,
}

pub struct ActuatorDriver<P: OutputPin, D = HostDelay> {
    line: Mutex<Option<Line<P, D>>>,
    ready: AtomicBool,
}

impl<P, D> ActuatorDriver<P, D>
where
    P: OutputPin + Send,
    D: DelayNs + Send,
{
    /// Take ownership of the opened output line.  An `Err` leaves the driver
    /// permanently not-ready: `run` returns `false` without blocking.
    pub fn new(pin: Result<P>, delay: D) -> Self {
        let line = match pin {
            Ok(mut pin) => {
                if pin.set_low().is_err() {
                    warn!("Motor line: initial LOW write failed");
                }
                info!("Motor driver ready");
                Some(Line { pin, delay })
            }
            Err(e) => {
                warn!("Motor driver unavailable: {}", e);
                None
            }
        };
        Self {
            ready: AtomicBool::new(line.is_some()),
            line: Mutex::new(line),
        }
    }
}

fn abort_run<P: OutputPin, D>(line: &mut Line<P, D>) -> bool {
    error!("Motor line write failed; aborting run");
    let _ = line.pin.set_low();
    false
}

impl<P, D> FeedActuator for ActuatorDriver<P, D>
where
    P: OutputPin + Send,
    D: DelayNs + Send,
{
    /// Blocks for `duration_ms`.  The line is left as the last period
    /// ended; the caller follows up with [`FeedActuator::stop`].
    fn run(&self, cmd: &FeedCommand) -> bool {
        if !self.is_ready() {
            warn!("Motor not initialised; ignoring run request");
            return false;
        }
        let mut guard = self.line.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(line) = guard.as_mut() else {
            return false;
        };

        let plan = PwmPlan::new(cmd.duty_cycle_percent(), cmd.period_ms());
        let duty = cmd.duty_cycle_percent();
        let deadline = Instant::now() + Duration::from_millis(u64::from(cmd.duration_ms()));
        info!(
            "Motor run ({}): duty={}% period={}ms duration={}ms",
            if cmd.is_override() { "override" } else { "automatic" },
            duty,
            cmd.period_ms(),
            cmd.duration_ms()
        );

        while Instant::now() < deadline {
            if duty > 0 {
                if line.pin.set_high().is_err() {
                    return abort_run(line);
                }
                line.delay.delay_us(plan.high.as_micros() as u32);
            }
            if duty < 100 {
                if line.pin.set_low().is_err() {
                    return abort_run(line);
                }
                line.delay.delay_us(plan.low.as_micros() as u32);
            }
        }
        true
    }

    fn stop(&self) {
        let mut guard = self.line.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(line) = guard.as_mut() {
            if line.pin.set_low().is_err() {
                error!("Motor stop: LOW write failed");
            } else {
                info!("Motor stopped");
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

impl<P: OutputPin, D> Drop for ActuatorDriver<P, D> {
    fn drop(&mut self) {
        let line = self.line.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(line) = line.as_mut() {
            // Leave the motor de-energised when the driver goes away.
            let _ = line.pin.set_low();
        }
    }
}
