//! JetBot motion & telemetry core.
//!
//! This library drives a differential-drive JetBot: it converts abstract
//! motion commands (move, rotate-by-angle, scan) into timed motor duty
//! cycles with dead-reckoning pose tracking and smooth deceleration, and
//! concurrently fans out annotated camera frames plus control state to any
//! number of WebSocket subscribers without stalling the control loop.
//!
//! Planning agents, the detector's neural inference, the physical I2C
//! transport and the camera pipeline are external collaborators reached
//! through the seams in [`detect`], [`motor::driver`] and [`telemetry`].

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod api;
pub mod detect;
pub mod drive;
pub mod motor;
pub mod scan;
pub mod telemetry;

// Re-export commonly used items for easier access
pub use detect::{Annotation, Detector, HttpDetector, Orientation};
pub use drive::{DriveController, MotionCommand, Pose, PoseTracker, RotationDirection};
pub use motor::{MotorActuator, MotorChannel};
pub use scan::{DetectionRecord, ScanOrchestrator, ScanReport};
pub use telemetry::{ControlState, FramePayload, TelemetryServer};

/// Top-level configuration for the JetBot core
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JetbotConfig {
    /// Motor hardware settings
    pub motor: MotorConfig,
    /// Differential-drive parameters
    pub drive: DriveConfig,
    /// Directional scan parameters
    pub scan: ScanConfig,
    /// Frame/telemetry distribution settings
    pub telemetry: TelemetryConfig,
    /// Motion control HTTP surface settings
    pub api: ApiConfig,
    /// Detection collaborator settings
    pub detector: DetectorConfig,
}

/// Motor hardware configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// I2C bus number the motor driver sits on
    pub i2c_bus: u8,
    /// Driver channel for the left motor
    pub left_channel: u8,
    /// Driver channel for the right motor
    pub right_channel: u8,
    /// Linear calibration scale for the left motor
    pub left_alpha: f64,
    /// Linear calibration scale for the right motor
    pub right_alpha: f64,
    /// Linear calibration offset for the left motor
    pub left_beta: f64,
    /// Linear calibration offset for the right motor
    pub right_beta: f64,
    /// Use the simulated bus instead of real hardware
    pub simulated: bool,
}

impl Default for MotorConfig {
    fn default() -> Self {
        MotorConfig {
            i2c_bus: 7,
            left_channel: 1,
            right_channel: 2,
            left_alpha: 1.0,
            right_alpha: 1.0,
            left_beta: 0.0,
            right_beta: 0.0,
            simulated: true,
        }
    }
}

/// Differential-drive parameters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Per-robot constant converting rotation angle to wheel-hold time at
    /// the fixed rotation duty (rad/s). Source revisions disagree on the
    /// value (2.3 vs 2.6), so it is a named parameter here.
    pub calibrated_angular_velocity: f64,
    /// Fixed duty used for rotations
    pub rotation_speed: f64,
    /// Number of discrete steps in a deceleration ramp
    pub decel_steps: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            calibrated_angular_velocity: 2.3,
            rotation_speed: 0.5,
            decel_steps: 20,
        }
    }
}

/// Directional scan parameters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of equal angular steps per full sweep
    pub turns: u32,
    /// Time-to-live for accumulated detection records (ms)
    pub inventory_ttl_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            turns: 4,
            inventory_ttl_ms: 60_000,
        }
    }
}

/// Frame/telemetry distribution settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Bind address for the WebSocket server
    pub host: String,
    /// Bind port for the WebSocket server
    pub port: u16,
    /// Target frame distribution rate
    pub target_fps: f64,
    /// Frames older than this are dropped as stale (seconds)
    pub stale_after_secs: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            host: "127.0.0.1".to_string(),
            port: 8890,
            target_fps: 20.0,
            stale_after_secs: 5.0,
        }
    }
}

/// Motion control HTTP surface settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address for the HTTP server
    pub host: String,
    /// Bind port for the HTTP server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8889,
        }
    }
}

/// Detection collaborator settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Base URL of the object-detection sidecar
    pub base_url: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            base_url: "http://localhost:8001/yolo".to_string(),
        }
    }
}

impl JetbotConfig {
    /// Loads configuration from a YAML file. Missing sections fall back to
    /// their defaults.
    pub fn load(path: &str) -> Result<Self, JetbotError> {
        let file = std::fs::File::open(path)
            .map_err(|e| JetbotError::Config(format!("cannot open {path}: {e}")))?;
        let config: Self = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter values the runtime cannot operate with. Rotation
    /// hold times divide by both rotation parameters, so zero or negative
    /// values are configuration-fatal.
    pub fn validate(&self) -> Result<(), JetbotError> {
        if self.drive.calibrated_angular_velocity <= 0.0 {
            return Err(JetbotError::Config(
                "drive.calibrated_angular_velocity must be positive".into(),
            ));
        }
        if self.drive.rotation_speed <= 0.0 {
            return Err(JetbotError::Config(
                "drive.rotation_speed must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// JetBot core error types
#[derive(Debug, thiserror::Error)]
pub enum JetbotError {
    /// No supported motor driver was detected at startup. Fatal: the
    /// process cannot continue without motor hardware.
    #[error("no supported motor driver found on I2C bus {bus}, addresses seen: {found:?}")]
    NoMotorDriver {
        /// Bus number that was probed
        bus: u8,
        /// Addresses that answered the probe
        found: Vec<u8>,
    },
    /// An I2C transfer failed after startup
    #[error("I2C transfer failed: {0}")]
    I2c(String),
    /// Configuration file missing or malformed
    #[error("configuration error: {0}")]
    Config(String),
    /// The detection collaborator was unreachable or answered garbage
    #[error("detector error: {0}")]
    Detector(String),
    /// Camera frame could not be read
    #[error("camera error: {0}")]
    Camera(String),
    /// A telemetry or detection sample was older than the freshness window
    #[error("stale sample: {age_ms} ms old")]
    Stale {
        /// Sample age in milliseconds
        age_ms: u64,
    },
    /// WebSocket transport failure
    #[error("websocket error: {0}")]
    Websocket(String),
}

impl From<serde_yaml::Error> for JetbotError {
    fn from(e: serde_yaml::Error) -> Self {
        JetbotError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for JetbotError {
    fn from(e: reqwest::Error) -> Self {
        JetbotError::Detector(e.to_string())
    }
}
