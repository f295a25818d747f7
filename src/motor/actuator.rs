// src/motor/actuator.rs
// Uniform "set duty cycle on channel" operation over whichever backend the
// probe selected, with per-channel linear calibration and clamping.

use log::{info, warn};

use super::driver::{I2cBus, MotorBackend};
use super::MotorChannel;
use crate::{JetbotError, MotorConfig};

/// Per-channel calibration and last-commanded state.
struct Channel {
    driver_channel: u8,
    alpha: f64,
    beta: f64,
    duty: f64,
}

/// Drives the two motor channels through the probed backend.
///
/// Duty values are clamped to [-1, 1] before the hardware write; callers
/// never see a rejection for an out-of-range value. The controller is the
/// only writer; telemetry reads the last commanded duties.
pub struct MotorActuator {
    bus: Box<dyn I2cBus>,
    backend: MotorBackend,
    channels: [Channel; 2],
    released: bool,
}

impl MotorActuator {
    /// Builds an actuator over an already-probed backend.
    pub fn new(bus: Box<dyn I2cBus>, backend: MotorBackend, config: &MotorConfig) -> Self {
        MotorActuator {
            bus,
            backend,
            channels: [
                Channel {
                    driver_channel: config.left_channel,
                    alpha: config.left_alpha,
                    beta: config.left_beta,
                    duty: 0.0,
                },
                Channel {
                    driver_channel: config.right_channel,
                    alpha: config.right_alpha,
                    beta: config.right_beta,
                    duty: 0.0,
                },
            ],
            released: false,
        }
    }

    /// Sets the duty cycle on one channel.
    ///
    /// Out-of-range values are silently clamped. The calibrated value
    /// (`alpha * duty + beta`, clamped again) is what reaches hardware;
    /// the raw clamped duty is what telemetry reports.
    pub fn set_duty(&mut self, channel: MotorChannel, value: f64) -> Result<(), JetbotError> {
        let duty = value.clamp(-1.0, 1.0);
        let ch = &mut self.channels[channel.index()];
        ch.duty = duty;
        let calibrated = (ch.alpha * duty + ch.beta).clamp(-1.0, 1.0);
        self.backend
            .write_duty(self.bus.as_mut(), ch.driver_channel, calibrated)
    }

    /// Last commanded duty on one channel.
    pub fn duty(&self, channel: MotorChannel) -> f64 {
        self.channels[channel.index()].duty
    }

    /// Both duties as a (left, right) pair.
    pub fn duties(&self) -> (f64, f64) {
        (self.channels[0].duty, self.channels[1].duty)
    }

    /// Sets both channels to zero. Always succeeds from the caller's point
    /// of view; an I2C fault on one channel must not keep the other alive.
    pub fn stop_all(&mut self) {
        for channel in [MotorChannel::Left, MotorChannel::Right] {
            if let Err(e) = self.set_duty(channel, 0.0) {
                warn!("failed to zero {channel:?} motor: {e}");
            }
        }
    }

    /// Forces both channels to a released state before process exit.
    /// Idempotent: a second call is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.channels[0].duty = 0.0;
        self.channels[1].duty = 0.0;
        match self.backend.release(self.bus.as_mut()) {
            Ok(()) => info!("motor outputs released"),
            Err(e) => warn!("motor release failed: {e}"),
        }
    }
}

impl Drop for MotorActuator {
    fn drop(&mut self) {
        self.release();
    }
}
