//! Feed controller commands against the assembled system.

use std::time::Duration;

use fishfeeder::app::commands::AppCommand;
use fishfeeder::app::events::{AppEvent, FeedTrigger, SkipReason};
use fishfeeder::app::ports::CommandReply;
use fishfeeder::app::service::FeedOutcome;
use fishfeeder::error::{Error, HardwareInitError};
use fishfeeder::system::{self, Hardware, SimControls};
use fishfeeder::adapters::sim::{SimAdc, SimBusOpener, SimEdgeSource, SimOutputPin, SyntheticCamera};

use super::mock_hw::{Rig, fish_scene, scratch_dir, test_config, wait_until};

#[test]
fn override_feeds_with_auto_mode_off() {
    let rig = Rig::new("override", false, fish_scene());
    rig.controller.start();

    let outcome = rig.controller.feed_fish(true);

    assert_eq!(
        outcome,
        FeedOutcome::Fed {
            trigger: FeedTrigger::Override,
            count: 1
        }
    );
    let status = rig.controller.status();
    assert_eq!(status.feed_count, 1);
    assert_eq!(status.auto_feed_count, 0);
    assert_ne!(status.last_feed_time, "Never");
    assert_eq!(status.auto_last_feed_time, "Never");
    assert!(!rig.controls.motor.is_high());
}

#[test]
fn feed_without_override_or_detection_is_denied() {
    let rig = Rig::new("denied", true, fish_scene());

    let outcome = rig.controller.feed_fish(false);

    assert_eq!(outcome, FeedOutcome::Skipped(SkipReason::PolicyDenied));
    assert_eq!(rig.controller.system_status().feed_count(), 0);
    assert!(rig.controls.motor.history().iter().all(|(high, _)| !*high));
    assert!(rig.sink.events().contains(&AppEvent::FeedSkipped {
        trigger: FeedTrigger::Automatic,
        reason: SkipReason::PolicyDenied
    }));
}

#[test]
fn feeds_are_serialized() {
    let rig = Rig::new("serial", false, fish_scene());
    let a = rig.controller.clone();
    let b = rig.controller.clone();

    let t1 = std::thread::spawn(move || a.feed_fish(true));
    let t2 = std::thread::spawn(move || b.feed_fish(true));
    let mut counts = [t1.join().unwrap(), t2.join().unwrap()].map(|o| match o {
        FeedOutcome::Fed { count, .. } => count,
        FeedOutcome::Skipped(r) => panic!("unexpected skip: {r}"),
    });
    counts.sort_unstable();

    assert_eq!(counts, [1, 2]);
    assert_eq!(rig.controller.system_status().feed_count(), 2);
}

#[test]
fn run_motor_clamps_and_stops() {
    let rig = Rig::new("run-motor", false, fish_scene());
    rig.controls.motor.clear_history();

    let started = std::time::Instant::now();
    let reply = rig.controller.execute(AppCommand::RunMotor {
        duty_cycle: 150,
        duration: 10,
        period: 1,
    });

    assert_eq!(reply, CommandReply::Accepted);
    // Duration is pulled up to the 100 ms floor.
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(!rig.controls.motor.is_high());
    assert_eq!(rig.controller.system_status().feed_count(), 0, "manual runs are not feeds");
}

#[test]
fn read_ph_updates_status() {
    let rig = Rig::new("ph", false, fish_scene());
    rig.controller.start();
    assert_eq!(rig.controller.status().last_ph_read_time, "Never");

    let sample = rig.controller.read_ph().unwrap();

    assert_eq!(sample.raw_code, 16_383);
    assert!((sample.voltage - 2.048).abs() < 0.01);
    assert!((sample.derived_value - 9.67).abs() < 0.05);
    let status = rig.controller.status();
    assert_eq!(status.current_ph_adc_value, 16_383);
    assert!((status.current_ph - sample.derived_value).abs() < f32::EPSILON);
    assert_ne!(status.last_ph_read_time, "Never");
    assert!(status.ph_sensor_initialized);
}

#[test]
fn ph_follows_the_adc() {
    let rig = Rig::new("ph-follow", false, fish_scene());
    rig.controller.start();

    rig.controls.adc.set_code(0);
    let sample = rig.controller.read_ph().unwrap();

    assert!((sample.derived_value - 21.34).abs() < 0.01);
}

#[test]
fn failed_adc_read_keeps_last_value() {
    let rig = Rig::new("ph-fail", false, fish_scene());
    rig.controller.start();
    rig.controller.read_ph().unwrap();

    rig.controls.adc.fail_reads(true);
    assert!(rig.controller.read_ph().is_err());

    assert_eq!(rig.controller.status().current_ph_adc_value, 16_383);
}

#[test]
fn missing_motor_line_degrades_gracefully() {
    let dir = scratch_dir("no-motor");
    let config = test_config(&dir, false);
    let (edges, motion) = SimEdgeSource::new();
    let adc = SimAdc::with_code(16_383);
    let hardware: Hardware<SimOutputPin, _, _, _> = Hardware {
        motor: Err(Error::HardwareInit(HardwareInitError::LineRequest(17))),
        motion: Ok(edges),
        analog: SimBusOpener::new(adc.clone()),
        camera: SyntheticCamera::new(fish_scene()),
    };
    let controls = SimControls {
        motion,
        adc,
        motor: SimOutputPin::new(),
    };
    let rig = Rig::with_hardware(dir, config, hardware, controls);
    rig.controller.start();

    assert_eq!(
        rig.controller.feed_fish(true),
        FeedOutcome::Skipped(SkipReason::ActuatorNotReady)
    );
    assert!(!rig.controller.run_motor(100, 100, 10));
    let status = rig.controller.status();
    assert!(!status.motor_initialized);
    assert_eq!(status.feed_count, 0);
    // The rest of the system still works.
    assert!(rig.controller.read_ph().is_ok());
}

#[test]
fn missing_adc_bus_reports_not_initialized() {
    let dir = scratch_dir("no-adc");
    let config = test_config(&dir, false);
    let (hardware, controls) = system::simulated_hardware(fish_scene());
    let hardware = Hardware {
        analog: SimBusOpener::failing(),
        ..hardware
    };
    let rig = Rig::with_hardware(dir, config, hardware, controls);
    rig.controller.start();

    assert!(!rig.controller.init_analog_sensor());
    assert!(rig.controller.read_ph().is_err());
    assert!(!rig.controller.status().ph_sensor_initialized);
    assert_eq!(rig.controller.feed_fish(true), FeedOutcome::Fed {
        trigger: FeedTrigger::Override,
        count: 1
    });
}

#[test]
fn periodic_sampling_starts_once_a_missing_bus_appears() {
    let dir = scratch_dir("late-adc");
    let mut config = test_config(&dir, false);
    config.analog.periodic = true;
    config.analog.sample_interval_ms = 20;
    let (hardware, controls) = system::simulated_hardware(fish_scene());
    let opener = SimBusOpener::new(controls.adc.clone());
    opener.fail_opens(true);
    let hardware = Hardware {
        analog: opener.clone(),
        ..hardware
    };
    let rig = Rig::with_hardware(dir, config, hardware, controls);
    rig.controller.start();
    assert!(!rig.controller.status().ph_sensor_initialized);

    opener.fail_opens(false);

    // No read_ph or init call: the periodic worker alone picks it up.
    assert!(wait_until(Duration::from_secs(2), || {
        rig.controller.status().last_ph_read_time != "Never"
    }));
    let status = rig.controller.status();
    assert!(status.ph_sensor_initialized);
    assert_eq!(status.current_ph_adc_value, 16_383);
}

#[test]
fn shutdown_leaves_motor_low() {
    let rig = Rig::new("shutdown", true, fish_scene());
    rig.controller.start();
    rig.controller.feed_fish(true);

    rig.controller.shutdown();

    assert!(!rig.controls.motor.is_high());
    assert!(rig.sink.events().contains(&AppEvent::Stopped));
    let status = rig.controller.status();
    assert!(!status.ph_sensor_initialized);
}
