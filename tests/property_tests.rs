//! Property tests for the pure pieces: clamping, PWM timing, ADC
//! conversion and command parsing.

use fishfeeder::app::commands::{AppCommand, parse_command};
use fishfeeder::drivers::actuator::PwmPlan;
use fishfeeder::safety::{
    DURATION_MAX_MS, DURATION_MIN_MS, FeedCommand, PERIOD_MAX_MS, PERIOD_MIN_MS,
};
use fishfeeder::sensors::analog::{Calibration, Gain, code_to_volts};
use proptest::prelude::*;

// ── Operating band ────────────────────────────────────────────

proptest! {
    #[test]
    fn clamped_commands_stay_in_band(
        duty in any::<i64>(),
        period in any::<i64>(),
        duration in any::<i64>(),
        is_override in any::<bool>(),
    ) {
        let cmd = FeedCommand::clamped(duty, period, duration, is_override);
        prop_assert!(cmd.duty_cycle_percent() <= 100);
        prop_assert!((PERIOD_MIN_MS..=PERIOD_MAX_MS).contains(&i64::from(cmd.period_ms())));
        prop_assert!((DURATION_MIN_MS..=DURATION_MAX_MS).contains(&i64::from(cmd.duration_ms())));
        prop_assert_eq!(cmd.is_override(), is_override);
    }

    #[test]
    fn in_band_commands_are_untouched(
        duty in 0i64..=100,
        period in PERIOD_MIN_MS..=PERIOD_MAX_MS,
        duration in DURATION_MIN_MS..=DURATION_MAX_MS,
    ) {
        let cmd = FeedCommand::clamped(duty, period, duration, false);
        prop_assert_eq!(i64::from(cmd.duty_cycle_percent()), duty);
        prop_assert_eq!(i64::from(cmd.period_ms()), period);
        prop_assert_eq!(i64::from(cmd.duration_ms()), duration);
    }
}

// ── PWM ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn pwm_plan_splits_the_whole_period(duty in 0u8..=255, period in 0u32..=100) {
        let plan = PwmPlan::new(duty, period);
        prop_assert_eq!(plan.period().as_micros(), u128::from(period) * 1_000);
        prop_assert!(plan.high <= plan.period());
        if duty >= 100 {
            prop_assert!(plan.low.is_zero());
        }
        if duty == 0 {
            prop_assert!(plan.high.is_zero());
        }
    }

    #[test]
    fn pwm_high_time_grows_with_duty(a in 0u8..=100, b in 0u8..=100, period in 5u32..=20) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(PwmPlan::new(lo, period).high <= PwmPlan::new(hi, period).high);
    }
}

// ── ADC conversion ────────────────────────────────────────────

proptest! {
    #[test]
    fn volts_stay_within_full_scale(raw in any::<i16>()) {
        let fs = Gain::Fs4_096.full_scale();
        let v = code_to_volts(raw, fs);
        prop_assert!(v.abs() <= fs * 1.001);
        prop_assert_eq!(v >= 0.0, raw >= 0);
    }

    #[test]
    fn default_calibration_is_decreasing(a in 0i16..=i16::MAX, b in 0i16..=i16::MAX) {
        let cal = Calibration { slope: -5.70, offset: 21.34 };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let fs = Gain::Fs4_096.full_scale();
        prop_assert!(cal.apply(code_to_volts(lo, fs)) >= cal.apply(code_to_volts(hi, fs)));
    }
}

// ── Command parsing ───────────────────────────────────────────

proptest! {
    #[test]
    fn parse_never_panics(body in ".{0,256}") {
        let _ = parse_command(&body);
    }

    #[test]
    fn run_motor_accepts_any_integers(duty in any::<i64>(), duration in any::<i64>(), period in any::<i64>()) {
        let body = format!(
            r#"{{"command":"run_motor","duty_cycle":{duty},"duration":{duration},"period":{period}}}"#
        );
        prop_assert_eq!(
            parse_command(&body),
            Ok(AppCommand::RunMotor { duty_cycle: duty, duration, period })
        );
    }

    #[test]
    fn feed_override_flag_round_trips(flag in any::<bool>()) {
        let body = format!(r#"{{"command":"feed_fish","override":{flag}}}"#);
        prop_assert_eq!(
            parse_command(&body),
            Ok(AppCommand::FeedFish { override_detection: flag })
        );
    }
}
