// src/drive/pose.rs
// Dead-reckoning pose estimate: the single source of truth for where the
// robot thinks it is, updated only from commanded motion. Drift is
// expected and never corrected by external sensing.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Estimated planar pose. Heading is in degrees, always within [0, 360).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X position (meters, commanded-motion units)
    pub x: f64,
    /// Y position
    pub y: f64,
    /// Heading in degrees, normalized to [0, 360)
    pub heading_deg: f64,
}

impl Pose {
    /// Origin pose: (0, 0) facing heading 0.
    pub fn origin() -> Self {
        Pose {
            x: 0.0,
            y: 0.0,
            heading_deg: 0.0,
        }
    }
}

/// Normalizes an angle in degrees into [0, 360).
pub fn normalize_heading(deg: f64) -> f64 {
    let h = deg.rem_euclid(360.0);
    // rem_euclid can yield 360.0 for tiny negative inputs after rounding
    if h >= 360.0 {
        h - 360.0
    } else {
        h
    }
}

/// Shared pose record: one writer (the drive controller), any number of
/// readers. Readers always observe a consistent (x, y, heading) triple.
#[derive(Clone)]
pub struct PoseTracker {
    inner: Arc<RwLock<Pose>>,
}

impl PoseTracker {
    /// Starts at the origin, as at robot startup.
    pub fn new() -> Self {
        PoseTracker {
            inner: Arc::new(RwLock::new(Pose::origin())),
        }
    }

    /// Atomic snapshot of the full pose triple.
    pub fn snapshot(&self) -> Pose {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Advances the position by a straight-line displacement along the
    /// current heading. Heading is held constant during the segment; this
    /// is a simplifying approximation, not a physical simulation.
    pub fn apply_translation(&self, distance: f64) {
        let mut pose = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let displacement: Vector2<f64> =
            Rotation2::new(pose.heading_deg.to_radians()) * Vector2::new(distance, 0.0);
        pose.x += displacement.x;
        pose.y += displacement.y;
    }

    /// Turns the heading by a signed angle, keeping it in [0, 360).
    pub fn apply_rotation(&self, angle_deg: f64) {
        let mut pose = self.inner.write().unwrap_or_else(|e| e.into_inner());
        pose.heading_deg = normalize_heading(pose.heading_deg + angle_deg);
    }
}

impl Default for PoseTracker {
    fn default() -> Self {
        Self::new()
    }
}
