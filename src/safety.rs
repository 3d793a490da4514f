//! Safe operating band for the feed motor.
//!
//! Every actuation request, whether it comes from the request server, the
//! configured feed sequence or a direct driver call, passes through these
//! clamps.  Out-of-band values are silently pulled to the nearest limit,
//! never rejected:
//!
//! | Parameter | Band          |
//! |-----------|---------------|
//! | duty      | 0 – 100 %     |
//! | period    | 5 – 20 ms     |
//! | duration  | 100 – 10000 ms|

use log::debug;

use crate::config::FeedStep;

pub const DUTY_MIN: i64 = 0;
pub const DUTY_MAX: i64 = 100;
pub const PERIOD_MIN_MS: i64 = 5;
pub const PERIOD_MAX_MS: i64 = 20;
pub const DURATION_MIN_MS: i64 = 100;
pub const DURATION_MAX_MS: i64 = 10_000;

pub fn clamp_duty(duty: i64) -> u8 {
    duty.clamp(DUTY_MIN, DUTY_MAX) as u8
}

pub fn clamp_period_ms(period_ms: i64) -> u32 {
    period_ms.clamp(PERIOD_MIN_MS, PERIOD_MAX_MS) as u32
}

pub fn clamp_duration_ms(duration_ms: i64) -> u32 {
    duration_ms.clamp(DURATION_MIN_MS, DURATION_MAX_MS) as u32
}

/// A validated actuation request.  Only constructible through the clamping
/// constructors, so every instance is inside the operating band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCommand {
    duty_cycle_percent: u8,
    period_ms: u32,
    duration_ms: u32,
    is_override: bool,
}

impl FeedCommand {
    pub fn clamped(duty: i64, period_ms: i64, duration_ms: i64, is_override: bool) -> Self {
        let cmd = Self {
            duty_cycle_percent: clamp_duty(duty),
            period_ms: clamp_period_ms(period_ms),
            duration_ms: clamp_duration_ms(duration_ms),
            is_override,
        };
        if i64::from(cmd.duty_cycle_percent) != duty
            || i64::from(cmd.period_ms) != period_ms
            || i64::from(cmd.duration_ms) != duration_ms
        {
            debug!(
                "Feed command clamped: duty {}->{} period {}->{}ms duration {}->{}ms",
                duty, cmd.duty_cycle_percent, period_ms, cmd.period_ms, duration_ms, cmd.duration_ms
            );
        }
        cmd
    }

    pub fn from_step(step: &FeedStep, is_override: bool) -> Self {
        Self::clamped(
            i64::from(step.duty_cycle_percent),
            i64::from(step.period_ms),
            i64::from(step.duration_ms),
            is_override,
        )
    }

    pub fn duty_cycle_percent(&self) -> u8 {
        self.duty_cycle_percent
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Detection was bypassed: an override feed or a manual motor run.
    pub fn is_override(&self) -> bool {
        self.is_override
    }
}
