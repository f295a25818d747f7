// src/drive/mod.rs
// Differential-drive layer: motion primitives on top of the actuator plus
// the dead-reckoning pose estimate they maintain.

pub mod controller;
pub mod pose;

pub use controller::{DriveController, RotationDirection};
pub use pose::{Pose, PoseTracker};

use serde::{Deserialize, Serialize};

use crate::detect::Orientation;

/// A motion request, as issued by planners over HTTP or as an inbound
/// WebSocket control message. Consumed synchronously by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Drive both wheels forward
    Forward {
        /// Duty in [0, 1]
        #[serde(default = "default_speed")]
        speed: f64,
        /// Hold time in seconds; `None` holds until an explicit stop
        #[serde(default)]
        duration: Option<f64>,
    },
    /// Drive both wheels backward
    Backward {
        /// Duty in [0, 1]
        #[serde(default = "default_speed")]
        speed: f64,
        /// Hold time in seconds; `None` holds until an explicit stop
        #[serde(default)]
        duration: Option<f64>,
    },
    /// Rotate in place by a signed angle (positive = clockwise)
    Rotate {
        /// Rotation angle in degrees
        angle: f64,
    },
    /// Immediate hard stop, bypassing deceleration
    Stop,
    /// Full-circle directional scan
    Scan {
        /// Target words for the detector; empty still sweeps
        #[serde(default)]
        words: Vec<String>,
        /// Optional orientation filter for detections
        #[serde(default)]
        orientation: Option<Orientation>,
    },
}

fn default_speed() -> f64 {
    0.5
}
