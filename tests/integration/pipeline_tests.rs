//! End-to-end detection pipeline on simulated devices:
//! motion pulse → capture → classify → archive → automatic feed.

use std::time::{Duration, Instant};

use fishfeeder::app::events::{AppEvent, FeedTrigger};
use fishfeeder::config::FeedStep;
use fishfeeder::system;

use super::mock_hw::{Rig, empty_scene, fish_scene, scratch_dir, test_config, wait_until};

const PIPELINE_TIMEOUT: Duration = Duration::from_secs(10);
/// Quiet time after the expected work, to catch anything extra.
const GRACE: Duration = Duration::from_millis(500);

/// Split a motor history into runs: each run is a stretch of HIGH writes
/// closed by the LOW that ends it.  Returns (first HIGH, closing LOW).
fn motor_runs(history: &[(bool, Instant)]) -> Vec<(Instant, Instant)> {
    let mut runs = Vec::new();
    let mut open = None;
    for &(high, at) in history {
        match (high, open) {
            (true, None) => open = Some(at),
            (false, Some(first)) => {
                runs.push((first, at));
                open = None;
            }
            _ => {}
        }
    }
    assert!(open.is_none(), "motor run never closed");
    runs
}

fn classified(rig: &Rig) -> usize {
    rig.sink.count(|e| matches!(e, AppEvent::FrameClassified { .. }))
}

fn auto_feeds(rig: &Rig) -> usize {
    rig.sink.count(|e| {
        matches!(
            e,
            AppEvent::FeedCompleted {
                trigger: FeedTrigger::Automatic,
                ..
            }
        )
    })
}

#[test]
fn motion_with_fish_in_view_feeds_automatically() {
    let rig = Rig::new("auto-feed", true, fish_scene());
    rig.controller.start();
    rig.controls.motor.clear_history();
    let status = rig.controller.system_status();
    assert_eq!(status.auto_feed_count(), 0);

    rig.controls.motion.pulse();

    assert!(
        wait_until(PIPELINE_TIMEOUT, || status.auto_feed_count() == 1),
        "automatic feed did not happen: {:?}",
        rig.sink.events()
    );
    assert_eq!(status.feed_count(), 0, "automatic feeds use their own counter");
    assert!(status.fish_detected());

    let last = status.last_image().expect("positive frame recorded");
    assert!(last.exists());
    let archived: Vec<_> = std::fs::read_dir(rig.dir.join("archive"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(archived.iter().any(|n| n.starts_with("fish_")), "{archived:?}");

    assert!(!rig.controls.motor.is_high(), "motor left running");

    // One motion event: one capture, one feed, and nothing afterwards.
    std::thread::sleep(GRACE);
    assert_eq!(status.auto_feed_count(), 1);
    assert_eq!(classified(&rig), 1);
    assert_eq!(auto_feeds(&rig), 1);
    assert_eq!(motor_runs(&rig.controls.motor.history()).len(), 1);

    let events = rig.sink.events();
    assert!(events.contains(&AppEvent::MotionDetected { capture_requested: true }));
    assert!(events.contains(&AppEvent::FeedCompleted {
        trigger: FeedTrigger::Automatic,
        count: 1
    }));
}

#[test]
fn motion_without_fish_does_not_feed() {
    let rig = Rig::new("no-fish", true, empty_scene());
    rig.controller.start();

    rig.controls.motion.pulse();

    let classified = wait_until(PIPELINE_TIMEOUT, || {
        rig.sink
            .count(|e| matches!(e, AppEvent::FrameClassified { positive: false, .. }))
            == 1
    });
    assert!(classified, "{:?}", rig.sink.events());

    let status = rig.controller.system_status();
    assert!(!status.fish_detected());
    assert_eq!(status.auto_feed_count(), 0);
    assert_eq!(status.last_image(), None);
    assert!(rig.controls.motor.history().iter().all(|(high, _)| !*high));
}

#[test]
fn producers_are_idle_while_auto_mode_is_off() {
    let rig = Rig::new("manual", false, fish_scene());
    rig.controller.start();

    rig.controls.motion.pulse();
    std::thread::sleep(Duration::from_millis(300));

    let status = rig.controller.status();
    assert!(!status.auto_mode_enabled);
    assert_eq!(status.auto_feed_count, 0);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::MotionDetected { .. })), 0);
}

#[test]
fn enabling_auto_mode_starts_the_pipeline() {
    let rig = Rig::new("enable", false, fish_scene());
    rig.controller.start();

    rig.controller.set_auto_mode(true);
    rig.controls.motion.pulse();

    let status = rig.controller.system_status();
    assert!(
        wait_until(PIPELINE_TIMEOUT, || status.auto_feed_count() >= 1),
        "{:?}",
        rig.sink.events()
    );
    assert!(rig.sink.events().contains(&AppEvent::AutoModeChanged(true)));
}

#[test]
fn disabling_auto_mode_stops_reacting_to_motion() {
    let rig = Rig::new("disable", true, fish_scene());
    rig.controller.start();

    rig.controller.set_auto_mode(false);
    rig.controls.motion.pulse();
    std::thread::sleep(Duration::from_millis(300));

    assert_eq!(rig.controller.system_status().auto_feed_count(), 0);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::MotionDetected { .. })), 0);
}

#[test]
fn motion_line_failure_marks_sensor_unhealthy() {
    let rig = Rig::new("motion-fail", true, fish_scene());
    rig.controller.start();
    assert!(rig.controller.status().motion_sensor_healthy);

    rig.controls.motion.fail("line went away");

    assert!(wait_until(PIPELINE_TIMEOUT, || !rig.controller.status().motion_sensor_healthy));
    assert!(rig.controller.status().camera_healthy);
}

#[test]
fn motion_burst_during_a_feed_coalesces_into_one_more_capture() {
    let dir = scratch_dir("burst");
    let mut config = test_config(&dir, true);
    config.feed.sequence = [FeedStep {
        duty_cycle_percent: 100,
        period_ms: 10,
        duration_ms: 600,
    }]
    .into_iter()
    .collect();
    let (hardware, controls) = system::simulated_hardware(fish_scene());
    let rig = Rig::with_hardware(dir, config, hardware, controls);
    rig.controller.start();
    rig.controls.motor.clear_history();
    let status = rig.controller.system_status();

    rig.controls.motion.pulse();
    assert!(
        wait_until(PIPELINE_TIMEOUT, || rig.controls.motor.is_high()),
        "first feed never started: {:?}",
        rig.sink.events()
    );

    // The capture thread is busy feeding; every pulse lands in one pending
    // request.
    for _ in 0..5 {
        rig.controls.motion.pulse();
    }
    assert!(wait_until(PIPELINE_TIMEOUT, || {
        rig.sink.count(|e| matches!(e, AppEvent::MotionDetected { .. })) == 6
    }));
    assert_eq!(auto_feeds(&rig), 0, "burst arrived after the first feed");

    assert!(
        wait_until(PIPELINE_TIMEOUT, || status.auto_feed_count() == 2),
        "{:?}",
        rig.sink.events()
    );
    std::thread::sleep(GRACE);
    assert_eq!(status.auto_feed_count(), 2);
    assert_eq!(classified(&rig), 2);
    assert_eq!(auto_feeds(&rig), 2);

    // Runs never overlap: the second starts only after the first's final LOW.
    let runs = motor_runs(&rig.controls.motor.history());
    assert_eq!(runs.len(), 2, "{runs:?}");
    let (_, first_end) = runs[0];
    let (second_start, _) = runs[1];
    assert!(second_start > first_end);
    for (start, end) in runs {
        assert!(end - start >= Duration::from_millis(600));
    }
    assert!(!rig.controls.motor.is_high());
}
