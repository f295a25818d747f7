// Integration tests for the differential-drive controller: timed motion,
// dead-reckoning pose updates, deceleration ramps and stop interrupts.
// Timers run under tokio's paused clock so held durations are exact.

use rstest::rstest;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jetbot_core::motor::{probe_backend, MotorActuator, SimulatedBus};
use jetbot_core::{DriveConfig, DriveController, MotorConfig, PoseTracker, RotationDirection};

fn controller() -> (Arc<DriveController>, Arc<Mutex<MotorActuator>>) {
    let mut bus = SimulatedBus::new();
    let backend = probe_backend(&mut bus, 7).unwrap();
    let actuator = Arc::new(Mutex::new(MotorActuator::new(
        Box::new(bus),
        backend,
        &MotorConfig::default(),
    )));
    let drive = DriveController::new(
        Arc::clone(&actuator),
        PoseTracker::new(),
        DriveConfig::default(),
    );
    (Arc::new(drive), actuator)
}

#[rstest]
#[case(90.0)]
#[case(45.5)]
#[case(270.0)]
#[case(-120.0)]
#[tokio::test(start_paused = true)]
async fn rotate_then_counter_rotate_restores_heading(#[case] angle: f64) {
    let (drive, _) = controller();
    let initial = drive.pose().heading_deg;

    drive.rotate(angle).await.unwrap();
    drive.rotate(-angle).await.unwrap();

    let restored = drive.pose().heading_deg;
    assert!(
        (restored - initial).abs() < 1e-9,
        "heading {restored} after ±{angle}, expected {initial}"
    );
}

#[tokio::test(start_paused = true)]
async fn four_quarter_turns_return_to_start() {
    let (drive, _) = controller();
    for _ in 0..4 {
        let (_, direction) = drive.rotate(90.0).await.unwrap();
        assert_eq!(direction, RotationDirection::Clockwise);
    }
    assert!(drive.pose().heading_deg.abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn zero_angle_rotate_is_a_noop() {
    let (drive, actuator) = controller();
    let before = tokio::time::Instant::now();
    let (pose, direction) = drive.rotate(0.0).await.unwrap();

    assert_eq!(direction, RotationDirection::None);
    assert_eq!(pose.heading_deg, 0.0);
    // No sleep happened and no duty was applied.
    assert_eq!(tokio::time::Instant::now(), before);
    let act = actuator.lock().unwrap();
    assert_eq!(act.duties(), (0.0, 0.0));
}

#[tokio::test(start_paused = true)]
async fn forward_half_speed_for_two_seconds_advances_one_unit() {
    let (drive, actuator) = controller();
    let pose = drive.forward(0.5, Some(2.0)).await.unwrap();

    assert!((pose.x - 1.0).abs() < 1e-9, "x was {}", pose.x);
    assert!(pose.y.abs() < 1e-9);
    assert_eq!(pose.heading_deg, 0.0);
    // Ramp must end at exactly zero duty on both channels.
    assert_eq!(actuator.lock().unwrap().duties(), (0.0, 0.0));
}

#[tokio::test(start_paused = true)]
async fn pose_is_vector_sum_of_segments() {
    let (drive, _) = controller();

    drive.forward(0.5, Some(1.0)).await.unwrap(); // +0.5 along heading 0
    drive.rotate(90.0).await.unwrap();
    drive.forward(0.5, Some(2.0)).await.unwrap(); // +1.0 along heading 90
    drive.rotate(-90.0).await.unwrap();
    let pose = drive.backward(0.25, Some(2.0)).await.unwrap(); // -0.5 along heading 0

    assert!(pose.x.abs() < 1e-9, "x was {}", pose.x);
    assert!((pose.y - 1.0).abs() < 1e-9, "y was {}", pose.y);
    assert!(pose.heading_deg.abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn stop_during_ramp_forces_immediate_zero() {
    let (drive, actuator) = controller();

    let motion = {
        let drive = Arc::clone(&drive);
        tokio::spawn(async move { drive.forward(0.5, Some(10.0)).await })
    };

    // 10s move: full duty until 9s, ramping until 10s. Land mid-ramp.
    tokio::time::sleep(Duration::from_secs_f64(9.2)).await;
    {
        let act = actuator.lock().unwrap();
        let (left, right) = act.duties();
        assert!(left > 0.0 && left < 0.5, "expected mid-ramp duty, got {left}");
        assert!(right > 0.0 && right < 0.5);
    }

    drive.stop();
    assert_eq!(actuator.lock().unwrap().duties(), (0.0, 0.0));

    // No further ramp step may reapply a duty after the stop.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(actuator.lock().unwrap().duties(), (0.0, 0.0));

    // The interrupted move dead-reckons the fraction actually driven.
    let pose = motion.await.unwrap().unwrap();
    assert!(pose.x > 4.0 && pose.x < 5.0, "x was {}", pose.x);
}

#[tokio::test(start_paused = true)]
async fn unbounded_hold_settles_pose_on_stop() {
    let (drive, actuator) = controller();

    drive.forward(0.3, None).await.unwrap();
    assert_eq!(actuator.lock().unwrap().duties(), (0.3, 0.3));

    tokio::time::sleep(Duration::from_secs(2)).await;
    drive.stop();

    assert_eq!(actuator.lock().unwrap().duties(), (0.0, 0.0));
    let pose = drive.pose();
    assert!((pose.x - 0.6).abs() < 1e-6, "x was {}", pose.x);
}

#[tokio::test(start_paused = true)]
async fn new_primitive_settles_a_displaced_unbounded_hold() {
    let (drive, _) = controller();

    drive.forward(0.3, None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    // Rotate without an intervening stop: the hold's distance must still
    // land in the pose before the turn.
    let (pose, _) = drive.rotate(90.0).await.unwrap();

    assert!((pose.x - 0.6).abs() < 1e-6, "x was {}", pose.x);
    assert!(pose.y.abs() < 1e-9);
    assert!((pose.heading_deg - 90.0).abs() < 1e-9);
}

// Runs on the multi-threaded runtime with real time: stop() racing a
// deceleration lane must never let a stale ramp write outlive the stop.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_racing_a_ramp_never_leaves_duty_applied() {
    for _ in 0..50 {
        let (drive, actuator) = controller();
        let motion = {
            let drive = Arc::clone(&drive);
            tokio::spawn(async move { drive.forward(0.5, Some(0.025)).await })
        };

        // Land inside (or right around) the ramp window.
        tokio::time::sleep(Duration::from_millis(23)).await;
        drive.stop();
        let _ = motion.await.unwrap();

        assert_eq!(actuator.lock().unwrap().duties(), (0.0, 0.0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(actuator.lock().unwrap().duties(), (0.0, 0.0));
    }
}

#[tokio::test(start_paused = true)]
async fn speed_is_clamped_not_rejected() {
    let (drive, actuator) = controller();

    let motion = {
        let drive = Arc::clone(&drive);
        tokio::spawn(async move { drive.forward(7.0, Some(1.0)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(actuator.lock().unwrap().duties(), (1.0, 1.0));

    let pose = motion.await.unwrap().unwrap();
    assert!((pose.x - 1.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn backward_mirrors_forward() {
    let (drive, _) = controller();
    let pose = drive.backward(0.5, Some(2.0)).await.unwrap();
    assert!((pose.x + 1.0).abs() < 1e-9, "x was {}", pose.x);
    assert!(pose.y.abs() < 1e-9);
}
