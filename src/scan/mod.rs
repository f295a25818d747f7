// src/scan/mod.rs
// Directional scan: sweep the robot through equal clockwise steps, query
// the detector at each step, and tag every detection with the pose and the
// heading relative to where the sweep started. Relative tagging keeps the
// inventory usable regardless of drift accumulated before the scan.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::detect::{Annotation, Detector, Orientation};
use crate::drive::{DriveController, Pose};
use crate::{JetbotError, ScanConfig};

/// One spatially-tagged sighting of an object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Detected class label
    pub item: String,
    /// Robot x position when the object was seen
    pub seen_at_x: f64,
    /// Robot y position when the object was seen
    pub seen_at_y: f64,
    /// Absolute robot heading plus the detection's intra-frame offset
    pub heading_at_detection: f64,
    /// Object heading relative to the heading at scan start, [0, 360)
    pub angle_from_scan_start: f64,
    /// Wall-clock time of the sighting
    pub timestamp_ms: u64,
}

/// Result of a full sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanReport {
    /// Pose when the sweep finished
    #[serde(flatten)]
    pub pose: Pose,
    /// Net heading change since scan start, [0, 360)
    pub heading_traveled: f64,
    /// Every surviving record in the inventory, oldest first
    pub items: Vec<DetectionRecord>,
}

/// Accumulated sightings with a time-to-live. Stale records are dropped
/// lazily on the next append or read, never by a background timer.
pub struct DetectionInventory {
    records: Vec<DetectionRecord>,
    ttl_ms: u64,
}

impl DetectionInventory {
    /// Empty inventory with the given record lifetime.
    pub fn new(ttl_ms: u64) -> Self {
        DetectionInventory {
            records: Vec::new(),
            ttl_ms,
        }
    }

    /// Drops every record older than the TTL relative to `now_ms`.
    pub fn gc(&mut self, now_ms: u64) {
        let ttl = self.ttl_ms;
        self.records
            .retain(|r| now_ms.saturating_sub(r.timestamp_ms) < ttl);
    }

    /// Appends a record (GC is the caller's concern, done per batch).
    pub fn push(&mut self, record: DetectionRecord) {
        self.records.push(record);
    }

    /// Surviving records, oldest first.
    pub fn records(&mut self, now_ms: u64) -> Vec<DetectionRecord> {
        self.gc(now_ms);
        self.records.clone()
    }
}

/// Runs full-circle sweeps and keeps the shared detection inventory.
pub struct ScanOrchestrator {
    controller: Arc<DriveController>,
    detector: Arc<dyn Detector>,
    inventory: Mutex<DetectionInventory>,
    config: ScanConfig,
}

impl ScanOrchestrator {
    /// Wires the orchestrator to the drive controller and a detector.
    pub fn new(
        controller: Arc<DriveController>,
        detector: Arc<dyn Detector>,
        config: ScanConfig,
    ) -> Self {
        let ttl = config.inventory_ttl_ms;
        ScanOrchestrator {
            controller,
            detector,
            inventory: Mutex::new(DetectionInventory::new(ttl)),
            config,
        }
    }

    /// Sweeps a full circle in `turns` equal clockwise steps, querying the
    /// detector at each step. An empty word list still performs the full
    /// rotation (generic environment survey) and may yield no detections.
    ///
    /// A detector fault at one step is logged and contributes zero
    /// detections; the rotation geometry of the sweep is preserved.
    pub async fn scan(
        &self,
        words: &[String],
        orientation: Option<Orientation>,
    ) -> Result<ScanReport, JetbotError> {
        if let Err(e) = self.detector.register_targets(words).await {
            warn!("target registration failed, sweeping with current prompts: {e}");
        }

        let start_heading = self.controller.pose().heading_deg;
        let turns = self.config.turns.max(1);
        let step_deg = 360.0 / turns as f64;
        let settle = Duration::from_secs_f64(3.0 / turns as f64);

        for step in 0..turns {
            let annotations = match self.detector.detect(words, orientation).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("detector unavailable at step {step}: {e}");
                    Vec::new()
                }
            };

            let pose = self.controller.pose();
            self.record_step(&annotations, pose, start_heading);
            debug!(
                "scan step {}/{turns}: {} annotations at heading {:.1}°",
                step + 1,
                annotations.len(),
                pose.heading_deg
            );

            self.controller.rotate(step_deg).await?;
            tokio::time::sleep(settle).await;
        }

        let pose = self.controller.pose();
        let heading_traveled = (pose.heading_deg - start_heading).rem_euclid(360.0);
        let items = self
            .inventory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records(now_ms());

        Ok(ScanReport {
            pose,
            heading_traveled,
            items,
        })
    }

    /// Appends one step's annotations to the inventory. Synchronous on
    /// purpose: the inventory lock must never be held across an await.
    fn record_step(&self, annotations: &[Annotation], pose: Pose, start_heading: f64) {
        let now = now_ms();
        let mut inventory = self.inventory.lock().unwrap_or_else(|e| e.into_inner());
        inventory.gc(now);
        for annotation in annotations {
            // Intra-frame offset added to the robot's absolute heading
            // gives the absolute heading of the object itself.
            let heading_now = pose.heading_deg + annotation.rotation_offset();
            let relative = (heading_now - start_heading).rem_euclid(360.0);
            inventory.push(DetectionRecord {
                item: annotation.label.clone(),
                seen_at_x: pose.x,
                seen_at_y: pose.y,
                heading_at_detection: heading_now.rem_euclid(360.0),
                angle_from_scan_start: relative,
                timestamp_ms: now,
            });
        }
    }

    /// Surviving inventory without sweeping (GC applied on read).
    pub fn inventory(&self) -> Vec<DetectionRecord> {
        self.inventory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records(now_ms())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: u64) -> DetectionRecord {
        DetectionRecord {
            item: "cup".into(),
            seen_at_x: 0.0,
            seen_at_y: 0.0,
            heading_at_detection: 0.0,
            angle_from_scan_start: 0.0,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn gc_drops_only_expired_records() {
        let mut inventory = DetectionInventory::new(60_000);
        inventory.push(record(1_000));
        inventory.push(record(50_000));
        inventory.push(record(70_000));

        let survivors = inventory.records(61_500);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].timestamp_ms, 50_000);
    }

    #[test]
    fn record_exactly_at_ttl_is_dropped() {
        let mut inventory = DetectionInventory::new(60_000);
        inventory.push(record(0));
        assert!(inventory.records(60_000).is_empty());
        let mut inventory = DetectionInventory::new(60_000);
        inventory.push(record(1));
        assert_eq!(inventory.records(60_000).len(), 1);
    }
}
