// Integration tests for the directional scan orchestrator: sweep
// geometry, relative-angle tagging and detector fault tolerance.

use mockall::mock;
use mockall::predicate::always;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jetbot_core::detect::{Annotation, Detector, Orientation};
use jetbot_core::motor::{probe_backend, MotorActuator, SimulatedBus};
use jetbot_core::scan::ScanOrchestrator;
use jetbot_core::{
    DriveConfig, DriveController, JetbotError, MotorConfig, PoseTracker, ScanConfig,
};

mock! {
    pub Det {}

    #[async_trait]
    impl Detector for Det {
        async fn register_targets(&self, words: &[String]) -> Result<(), JetbotError>;
        async fn detect(
            &self,
            words: &[String],
            orientation: Option<Orientation>,
        ) -> Result<Vec<Annotation>, JetbotError>;
    }
}

fn annotation(label: &str, rotation_deg: Option<f64>) -> Annotation {
    Annotation {
        label: label.to_string(),
        confidence: 0.9,
        bbox: Some([10.0, 10.0, 50.0, 90.0]),
        center: Some([30.0, 50.0]),
        area: Some(3200.0),
        rotation_deg,
    }
}

fn drive() -> Arc<DriveController> {
    let mut bus = SimulatedBus::new();
    let backend = probe_backend(&mut bus, 7).unwrap();
    let actuator = Arc::new(Mutex::new(MotorActuator::new(
        Box::new(bus),
        backend,
        &MotorConfig::default(),
    )));
    Arc::new(DriveController::new(
        actuator,
        PoseTracker::new(),
        DriveConfig::default(),
    ))
}

fn scanner(detector: MockDet) -> ScanOrchestrator {
    ScanOrchestrator::new(drive(), Arc::new(detector), ScanConfig::default())
}

#[tokio::test(start_paused = true)]
async fn default_sweep_queries_detector_once_per_step() {
    let mut detector = MockDet::new();
    detector
        .expect_register_targets()
        .times(1)
        .returning(|_| Ok(()));
    detector
        .expect_detect()
        .with(always(), always())
        .times(4)
        .returning(|_, _| Ok(vec![annotation("cup", Some(0.0))]));

    let report = scanner(detector)
        .scan(&["cup".to_string()], None)
        .await
        .unwrap();

    // Four 90° clockwise steps: net heading change is zero.
    assert!(report.heading_traveled.abs() < 1e-9);
    assert!(report.pose.heading_deg.abs() < 1e-9);

    // One sighting per step, tagged relative to the scan start.
    assert_eq!(report.items.len(), 4);
    for (i, item) in report.items.iter().enumerate() {
        let expected = i as f64 * 90.0;
        assert!(
            (item.angle_from_scan_start - expected).abs() < 1e-9,
            "step {i}: angle {} expected {expected}",
            item.angle_from_scan_start
        );
        assert_eq!(item.item, "cup");
    }
}

#[tokio::test(start_paused = true)]
async fn relative_angles_ignore_pre_scan_drift() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    detector
        .expect_detect()
        .times(4)
        .returning(|_, _| Ok(vec![annotation("chair", Some(0.0))]));

    let drive = drive();
    drive.rotate(45.0).await.unwrap();
    let orchestrator =
        ScanOrchestrator::new(Arc::clone(&drive), Arc::new(detector), ScanConfig::default());

    let report = orchestrator.scan(&["chair".to_string()], None).await.unwrap();

    // Accumulated heading before the scan must not leak into the tags.
    for (i, item) in report.items.iter().enumerate() {
        let expected = i as f64 * 90.0;
        assert!((item.angle_from_scan_start - expected).abs() < 1e-9);
    }
    assert!(report.heading_traveled.abs() < 1e-9);
    assert!((report.pose.heading_deg - 45.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn detection_offset_shifts_the_tagged_angle() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    let mut step = 0;
    detector.expect_detect().times(4).returning(move |_, _| {
        step += 1;
        if step == 1 {
            Ok(vec![annotation("bottle", Some(15.5))])
        } else {
            Ok(vec![])
        }
    });

    let report = scanner(detector)
        .scan(&["bottle".to_string()], None)
        .await
        .unwrap();

    assert_eq!(report.items.len(), 1);
    assert!((report.items[0].angle_from_scan_start - 15.5).abs() < 1e-9);
    assert!((report.items[0].heading_at_detection - 15.5).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn missing_rotation_offset_means_centered() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    let mut step = 0;
    detector.expect_detect().times(4).returning(move |_, _| {
        step += 1;
        if step == 1 {
            Ok(vec![annotation("person", None)])
        } else {
            Ok(vec![])
        }
    });

    let report = scanner(detector)
        .scan(&["person".to_string()], None)
        .await
        .unwrap();

    assert_eq!(report.items.len(), 1);
    assert!(report.items[0].angle_from_scan_start.abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn empty_word_list_still_performs_full_rotation() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    detector.expect_detect().times(4).returning(|_, _| Ok(vec![]));

    let report = scanner(detector).scan(&[], None).await.unwrap();

    assert!(report.items.is_empty());
    assert!(report.heading_traveled.abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn detector_fault_mid_sweep_keeps_geometry() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    let mut step = 0;
    detector.expect_detect().times(4).returning(move |_, _| {
        step += 1;
        if step <= 2 {
            Err(JetbotError::Detector("connection refused".into()))
        } else {
            Ok(vec![annotation("cup", Some(0.0))])
        }
    });

    let report = scanner(detector)
        .scan(&["cup".to_string()], None)
        .await
        .unwrap();

    // Failed steps contribute nothing; the sweep still closes the circle.
    assert_eq!(report.items.len(), 2);
    assert!((report.items[0].angle_from_scan_start - 180.0).abs() < 1e-9);
    assert!((report.items[1].angle_from_scan_start - 270.0).abs() < 1e-9);
    assert!(report.heading_traveled.abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn scan_runs_on_a_spawned_task() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    detector
        .expect_detect()
        .times(4)
        .returning(|_, _| Ok(vec![annotation("cup", Some(0.0))]));

    // The sweep future crosses a task boundary here, as it does when the
    // command dispatcher drives it.
    let orchestrator = Arc::new(scanner(detector));
    let sweep = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.scan(&["cup".to_string()], None).await })
    };

    let report = sweep.await.unwrap().unwrap();
    assert_eq!(report.items.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn records_carry_the_pose_at_their_step() {
    let mut detector = MockDet::new();
    detector.expect_register_targets().returning(|_| Ok(()));
    detector
        .expect_detect()
        .times(4)
        .returning(|_, _| Ok(vec![annotation("box", Some(0.0))]));

    let drive = drive();
    drive.forward(0.5, Some(2.0)).await.unwrap(); // pose (1, 0)
    let orchestrator =
        ScanOrchestrator::new(Arc::clone(&drive), Arc::new(detector), ScanConfig::default());

    let report = orchestrator.scan(&["box".to_string()], None).await.unwrap();

    for item in &report.items {
        assert!((item.seen_at_x - 1.0).abs() < 1e-9);
        assert!(item.seen_at_y.abs() < 1e-9);
    }
}
