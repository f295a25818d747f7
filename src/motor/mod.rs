// src/motor/mod.rs
// Motor hardware layer: backend probing/selection and the duty-cycle
// actuator sitting on top of it.

pub mod actuator;
pub mod driver;

pub use actuator::MotorActuator;
pub use driver::{probe_backend, I2cBus, MotorBackend, SimulatedBus};

/// One of the two independent motor channels of the differential drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorChannel {
    /// Left wheel
    Left,
    /// Right wheel
    Right,
}

impl MotorChannel {
    /// Index into per-channel state arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            MotorChannel::Left => 0,
            MotorChannel::Right => 1,
        }
    }
}
