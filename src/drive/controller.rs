// src/drive/controller.rs
// Motion primitives on top of the motor actuator: timed duty application
// with a smooth deceleration tail, serialized so only one primitive is in
// flight, and dead-reckoning pose updates at primitive boundaries.

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::pose::{Pose, PoseTracker};
use crate::motor::{MotorActuator, MotorChannel};
use crate::{DriveConfig, JetbotError};

/// Which way a rotation turned the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationDirection {
    /// Positive angle: left wheel forward, right wheel reverse
    Clockwise,
    /// Negative angle
    Counterclockwise,
    /// Zero-angle request, nothing moved
    None,
}

/// State of the primitive currently holding the motors.
struct ActiveMotion {
    token: CancellationToken,
    /// Signed speed and start instant of an unbounded hold, so `stop()`
    /// can dead-reckon the distance actually traveled.
    hold: Option<(f64, Instant)>,
}

/// Differential-drive controller.
///
/// Exclusively owns the actuator's channel state: nothing else writes duty
/// values. Motion primitives are serialized by an internal async mutex;
/// [`DriveController::stop`] deliberately bypasses it so it can interrupt
/// a primitive in flight.
pub struct DriveController {
    actuator: Arc<Mutex<MotorActuator>>,
    pose: PoseTracker,
    config: DriveConfig,
    motion: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveMotion>>,
}

impl DriveController {
    /// Wraps an actuator and a pose tracker.
    pub fn new(actuator: Arc<Mutex<MotorActuator>>, pose: PoseTracker, config: DriveConfig) -> Self {
        DriveController {
            actuator,
            pose,
            config,
            motion: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Current pose snapshot.
    pub fn pose(&self) -> Pose {
        self.pose.snapshot()
    }

    /// The shared pose tracker (read-only use by collaborators).
    pub fn pose_tracker(&self) -> &PoseTracker {
        &self.pose
    }

    /// Last commanded (left, right) duties, for telemetry.
    pub fn duties(&self) -> (f64, f64) {
        self.actuator.lock().unwrap_or_else(|e| e.into_inner()).duties()
    }

    /// Drives both wheels forward at `speed` duty. With a duration the
    /// call holds for 90% of it at full duty, then ramps down over the
    /// remaining 10%; without one the duty stays applied until `stop()`.
    ///
    /// Heading is held constant for the whole segment (dead-reckoning
    /// approximation). Returns the pose after the primitive completes.
    pub async fn forward(&self, speed: f64, duration: Option<f64>) -> Result<Pose, JetbotError> {
        self.move_straight(speed.clamp(0.0, 1.0), duration).await
    }

    /// Mirror of [`DriveController::forward`] with negated duty.
    pub async fn backward(&self, speed: f64, duration: Option<f64>) -> Result<Pose, JetbotError> {
        self.move_straight(-speed.clamp(0.0, 1.0), duration).await
    }

    /// Rotates in place by a signed angle in degrees (positive =
    /// clockwise). The hold time comes from the calibrated angular
    /// velocity at the fixed rotation duty; rotation is full duty for the
    /// whole hold with a hard stop, not a ramp, because small-angle ramps
    /// overshoot worse than they help.
    pub async fn rotate(&self, angle_deg: f64) -> Result<(Pose, RotationDirection), JetbotError> {
        if angle_deg == 0.0 {
            return Ok((self.pose.snapshot(), RotationDirection::None));
        }

        let _guard = self.motion.lock().await;
        let token = self.arm(None);

        let speed = self.config.rotation_speed;
        let omega = self.config.calibrated_angular_velocity * (speed / 0.5);
        let hold = angle_deg.to_radians().abs() / omega;

        let (left, right, direction) = if angle_deg > 0.0 {
            (speed, -speed, RotationDirection::Clockwise)
        } else {
            (-speed, speed, RotationDirection::Counterclockwise)
        };

        // Heading is committed up front; an interrupt mid-hold leaves the
        // estimate at this step's target rather than rolling back.
        self.pose.apply_rotation(angle_deg);

        self.set_duties(left, right)?;
        debug!("rotate {angle_deg:.1}° ({direction:?}), holding {hold:.3}s");

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(hold)) => {
                self.actuator.lock().unwrap_or_else(|e| e.into_inner()).stop_all();
                self.disarm();
            }
            _ = token.cancelled() => {
                debug!("rotate interrupted");
            }
        }

        Ok((self.pose.snapshot(), direction))
    }

    /// Immediate hard stop, bypassing deceleration. Cancels any ramp in
    /// progress and forces both duties to zero. Safe to call at any time,
    /// including while another primitive is in flight.
    pub fn stop(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        // Cancellation and zeroing happen under the actuator lock; ramp
        // lanes check the token under the same lock, so a lane can never
        // slip a stale duty write in after the channels were zeroed.
        let mut actuator = self.actuator.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(motion) = active {
            motion.token.cancel();
            if let Some((speed, started)) = motion.hold {
                // Unbounded hold: account the distance actually driven.
                self.pose.apply_translation(speed * started.elapsed().as_secs_f64());
            }
        }
        actuator.stop_all();
        info!("motors stopped");
    }

    async fn move_straight(
        &self,
        signed_speed: f64,
        duration: Option<f64>,
    ) -> Result<Pose, JetbotError> {
        let _guard = self.motion.lock().await;

        let duration = match duration {
            Some(d) if d <= 0.0 => {
                // Degenerate duration: nothing to hold, nothing to ramp.
                return Ok(self.pose.snapshot());
            }
            other => other,
        };

        let Some(duration) = duration else {
            // Hold indefinitely; stop() settles the pose from elapsed time.
            self.arm(Some(signed_speed));
            self.set_duties(signed_speed, signed_speed)?;
            return Ok(self.pose.snapshot());
        };

        let token = self.arm(None);
        let started = Instant::now();
        self.set_duties(signed_speed, signed_speed)?;

        // Full duty for 90% of the duration, smooth ramp for the rest.
        let hold = duration * 0.9;
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(hold)) => false,
            _ = token.cancelled() => true,
        };

        if !interrupted {
            let ramp_window = duration - hold;
            let steps = self.config.decel_steps.max(1);
            let step_secs = ramp_window / steps as f64;
            self.run_ramp(token.clone(), step_secs, steps).await;
        }

        if token.is_cancelled() {
            let fraction = (started.elapsed().as_secs_f64() / duration).min(1.0);
            self.pose.apply_translation(signed_speed * duration * fraction);
        } else {
            self.pose.apply_translation(signed_speed * duration);
            self.disarm();
        }

        Ok(self.pose.snapshot())
    }

    /// Ramps both channels from their current duty to exactly zero over
    /// `steps` discrete steps, one concurrent lane per channel so both
    /// wheels decelerate in lockstep. Cancellation aborts pending steps
    /// without writing again; `stop()` has already forced zero by then.
    async fn run_ramp(&self, token: CancellationToken, step_secs: f64, steps: u32) {
        let mut lanes = Vec::with_capacity(2);
        for channel in [MotorChannel::Left, MotorChannel::Right] {
            let actuator = Arc::clone(&self.actuator);
            let token = token.clone();
            lanes.push(tokio::spawn(decelerate_channel(
                actuator, channel, token, step_secs, steps,
            )));
        }
        for lane in lanes {
            let _ = lane.await;
        }
    }

    fn set_duties(&self, left: f64, right: f64) -> Result<(), JetbotError> {
        let mut actuator = self.actuator.lock().unwrap_or_else(|e| e.into_inner());
        actuator.set_duty(MotorChannel::Left, left)?;
        actuator.set_duty(MotorChannel::Right, right)
    }

    fn arm(&self, hold_speed: Option<f64>) -> CancellationToken {
        let token = CancellationToken::new();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            previous.token.cancel();
            if let Some((speed, started)) = previous.hold {
                // An unbounded hold displaced without an explicit stop
                // still gets its distance dead-reckoned into the pose.
                warn!("new primitive displaced an unbounded hold, settling its distance");
                self.pose.apply_translation(speed * started.elapsed().as_secs_f64());
            }
        }
        *active = Some(ActiveMotion {
            token: token.clone(),
            hold: hold_speed.map(|s| (s, Instant::now())),
        });
        token
    }

    fn disarm(&self) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// One deceleration lane: steps a single channel's duty toward zero,
/// finishing with an explicit zero write so rounding can never leave a
/// residual duty.
async fn decelerate_channel(
    actuator: Arc<Mutex<MotorActuator>>,
    channel: MotorChannel,
    token: CancellationToken,
    step_secs: f64,
    steps: u32,
) {
    let mut value = actuator.lock().unwrap_or_else(|e| e.into_inner()).duty(channel);
    for i in 0..steps {
        {
            // The token is inspected under the actuator lock, mirroring
            // stop(): either this write lands before the stop zeroes the
            // channels, or the cancellation is already visible here.
            let mut act = actuator.lock().unwrap_or_else(|e| e.into_inner());
            if token.is_cancelled() {
                return;
            }
            value -= value / (steps - i) as f64;
            if let Err(e) = act.set_duty(channel, value) {
                warn!("deceleration write failed on {channel:?}: {e}");
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs_f64(step_secs)).await;
    }
    let mut act = actuator.lock().unwrap_or_else(|e| e.into_inner());
    if !token.is_cancelled() {
        let _ = act.set_duty(channel, 0.0);
    }
}
