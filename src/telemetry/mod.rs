// src/telemetry/mod.rs
// Live telemetry: per-tick frame payloads (JPEG + motor state + control
// echo) pumped from the camera side into the distribution server.

pub mod latest;
pub mod server;

pub use latest::LatestSlot;
pub use server::TelemetryServer;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::drive::DriveController;
use crate::{JetbotError, TelemetryConfig};

/// Echo of the currently-active control command, shared between the HTTP
/// surface and the telemetry stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    /// Human-readable status, e.g. "moving forward"
    pub status: String,
    /// Speed of the active command, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Duration of the active command, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Angle of the active command, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

/// Shared slot holding the command currently in flight.
pub type CommandEcho = Arc<Mutex<Option<ControlState>>>;

/// One distributed telemetry sample. Serialized once per tick, handed to
/// every subscriber slot, never retained after delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FramePayload {
    /// Base64-encoded JPEG frame
    pub image: String,
    /// Last commanded left duty
    pub left_motor: f64,
    /// Last commanded right duty
    pub right_motor: f64,
    /// Currently-active control command, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlState>,
}

/// A JPEG frame with its capture time, as produced by the camera side.
pub struct JpegFrame {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// Capture wall-clock time, used for the freshness check
    pub captured_at: SystemTime,
}

/// Async seam to the camera pipeline.
#[async_trait]
pub trait FrameSource: Send {
    /// Grabs the next encoded frame. Errors are transient: the pump logs
    /// them and retries after a short pause.
    async fn next_frame(&mut self) -> Result<JpegFrame, JetbotError>;
}

/// Pumps frames into the distribution server at the target rate.
///
/// Frames are still consumed when nobody is connected (keeps the camera
/// pipeline alive); frames older than the freshness threshold are dropped
/// as stale rather than silently served.
pub async fn stream_frames<F: FrameSource>(
    mut camera: F,
    controller: Arc<DriveController>,
    echo: CommandEcho,
    server: Arc<TelemetryServer>,
    config: TelemetryConfig,
) {
    let period = Duration::from_secs_f64(1.0 / config.target_fps.max(1.0));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let frame = match camera.next_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame read failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        if server.subscriber_count() == 0 {
            continue;
        }

        match ensure_fresh(&frame, config.stale_after_secs) {
            Ok(()) => {}
            Err(JetbotError::Stale { age_ms }) => {
                warn!("dropping stale frame ({age_ms} ms old)");
                continue;
            }
            Err(e) => {
                warn!("frame freshness check failed: {e}");
                continue;
            }
        }

        let (left, right) = controller.duties();
        let payload = FramePayload {
            image: BASE64.encode(&frame.bytes),
            left_motor: left,
            right_motor: right,
            control: echo.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        };

        if let Err(e) = server.broadcast(&payload) {
            warn!("broadcast failed: {e}");
        } else {
            debug!(
                "broadcast frame ({} bytes) to {} subscribers",
                frame.bytes.len(),
                server.subscriber_count()
            );
        }
    }
}

/// Ok for a fresh frame, `Stale` once the capture time falls outside the
/// freshness window.
pub fn ensure_fresh(frame: &JpegFrame, stale_after_secs: f64) -> Result<(), JetbotError> {
    let age = SystemTime::now()
        .duration_since(frame.captured_at)
        .unwrap_or(Duration::ZERO);
    if age.as_secs_f64() > stale_after_secs {
        Err(JetbotError::Stale {
            age_ms: age.as_millis() as u64,
        })
    } else {
        Ok(())
    }
}
