// src/motor/driver.rs
// I2C bus seam and motor-driver backend selection.
//
// Two mutually exclusive backends are supported, detected once at startup
// by probing the bus for known device signatures:
// - Adafruit MotorHAT (PCA9685 PWM driver somewhere in 0x60..=0x67)
// - SparkFun Qwiic SCMD motor controller (fixed address 0x5D)
//
// Physical bus I/O is out of scope here; callers inject an `I2cBus`
// implementation. `SimulatedBus` stands in for real hardware in tests and
// in `simulated` mode.

use log::info;

use crate::JetbotError;

/// PCA9685 MODE1 register, used as the probe target for the MotorHAT.
const PCA9685_MODE1: u8 = 0x00;
/// First PWM channel register of the PCA9685 (LED0_ON_L).
const PCA9685_LED0_ON_L: u8 = 0x06;
/// Fixed address of the Qwiic SCMD.
const SCMD_ADDR: u8 = 0x5D;
/// Base of the SCMD per-motor drive registers.
const SCMD_DRIVE_BASE: u8 = 0x20;
/// SCMD driver enable register.
const SCMD_ENABLE: u8 = 0x70;

/// Minimal I2C master operations the motor layer needs.
///
/// Implementations wrap whatever transport the platform provides. All
/// methods map transport failures to [`JetbotError::I2c`].
pub trait I2cBus: Send {
    /// Reads a single byte from a device, no register addressing.
    fn read_byte(&mut self, addr: u8) -> Result<u8, JetbotError>;
    /// Reads one byte from a device register.
    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8, JetbotError>;
    /// Writes one byte to a device register.
    fn write_reg(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), JetbotError>;
    /// Writes a block of bytes starting at a device register.
    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), JetbotError>;
}

/// Which hardware drives the motors, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorBackend {
    /// Adafruit MotorHAT: duty goes out as a PWM register pair per channel.
    Adafruit {
        /// Address the PCA9685 answered on
        addr: u8,
    },
    /// SparkFun Qwiic SCMD: duty goes out as a 0-255 magnitude plus
    /// direction bit per motor.
    Qwiic,
}

/// Scans the 7-bit address range with cheap read probes.
fn scan_bus(bus: &mut dyn I2cBus) -> Vec<u8> {
    (0x03..0x78)
        .filter(|&addr| bus.read_byte(addr).is_ok())
        .collect()
}

/// Probes the bus and selects the motor backend.
///
/// The MotorHAT is checked first with an explicit MODE1 register read on
/// 0x60..=0x67, then the SCMD at its fixed address. Finding neither is a
/// configuration error the process cannot recover from.
pub fn probe_backend(bus: &mut dyn I2cBus, bus_num: u8) -> Result<MotorBackend, JetbotError> {
    let found = scan_bus(bus);

    for addr in 0x60..=0x67 {
        if bus.read_reg(addr, PCA9685_MODE1).is_ok() {
            info!("detected Adafruit MotorHAT (PCA9685) at 0x{addr:02x}");
            // Clear sleep/restart bits so PWM output is live.
            bus.write_reg(addr, PCA9685_MODE1, 0x00)?;
            return Ok(MotorBackend::Adafruit { addr });
        }
    }

    if found.contains(&SCMD_ADDR) {
        info!("detected SparkFun Qwiic SCMD at 0x{SCMD_ADDR:02x}");
        bus.write_reg(SCMD_ADDR, SCMD_ENABLE, 0x01)?;
        return Ok(MotorBackend::Qwiic);
    }

    Err(JetbotError::NoMotorDriver {
        bus: bus_num,
        found,
    })
}

impl MotorBackend {
    /// Writes a calibrated duty value for one driver channel.
    ///
    /// `value` is already clamped to [-1, 1]; `channel` is the 1-based
    /// driver channel from the motor config.
    pub fn write_duty(
        self,
        bus: &mut dyn I2cBus,
        channel: u8,
        value: f64,
    ) -> Result<(), JetbotError> {
        match self {
            MotorBackend::Adafruit { addr } => {
                let (ina, inb) = adafruit_pins(channel);
                let speed = ((value.abs() * 255.0) as u16).min(255);
                // 12-bit PWM: off-tick = speed * 16, one input pin held low
                // to set direction.
                let ticks = (speed * 16).min(4095);
                let (fwd, rev) = if value >= 0.0 { (ticks, 0) } else { (0, ticks) };
                write_pwm(bus, addr, ina, fwd)?;
                write_pwm(bus, addr, inb, rev)?;
                Ok(())
            }
            MotorBackend::Qwiic => {
                // SCMD motors are 0-based A/B; encode direction in the bit
                // above the 0-255 magnitude.
                let motor = channel.saturating_sub(1).min(1);
                let magnitude = ((value.abs() * 255.0) as u16).min(255) as u8;
                let direction: u8 = if value >= 0.0 { 0 } else { 1 };
                bus.write_reg(SCMD_ADDR, SCMD_DRIVE_BASE + motor * 2, magnitude)?;
                bus.write_reg(SCMD_ADDR, SCMD_DRIVE_BASE + motor * 2 + 1, direction)?;
                Ok(())
            }
        }
    }

    /// Forces every output this backend owns to a released/zero state.
    pub fn release(self, bus: &mut dyn I2cBus) -> Result<(), JetbotError> {
        match self {
            MotorBackend::Adafruit { addr } => {
                for channel in 1..=2 {
                    let (ina, inb) = adafruit_pins(channel);
                    write_pwm(bus, addr, ina, 0)?;
                    write_pwm(bus, addr, inb, 0)?;
                }
                Ok(())
            }
            MotorBackend::Qwiic => {
                for motor in 0..2u8 {
                    bus.write_reg(SCMD_ADDR, SCMD_DRIVE_BASE + motor * 2, 0)?;
                    bus.write_reg(SCMD_ADDR, SCMD_DRIVE_BASE + motor * 2 + 1, 0)?;
                }
                bus.write_reg(SCMD_ADDR, SCMD_ENABLE, 0x00)
            }
        }
    }
}

/// PCA9685 input-pin pair for a MotorHAT channel.
fn adafruit_pins(channel: u8) -> (u8, u8) {
    match channel {
        1 => (1, 0),
        2 => (2, 3),
        3 => (4, 5),
        _ => (6, 7),
    }
}

/// Writes one PCA9685 PWM channel: on-tick 0, off-tick `ticks`.
fn write_pwm(bus: &mut dyn I2cBus, addr: u8, pin: u8, ticks: u16) -> Result<(), JetbotError> {
    let reg = PCA9685_LED0_ON_L + 4 * pin;
    let data = [0x00, 0x00, (ticks & 0xff) as u8, (ticks >> 8) as u8];
    bus.write_block(addr, reg, &data)
}

/// In-memory I2C bus emulating a configurable set of devices.
///
/// Register writes are retained so the actuator and driver logic can be
/// exercised end to end without robot hardware.
pub struct SimulatedBus {
    devices: Vec<u8>,
    registers: std::collections::HashMap<(u8, u8), u8>,
}

impl SimulatedBus {
    /// A bus with only a Qwiic SCMD attached (the common JetBot setup).
    pub fn new() -> Self {
        Self::with_devices(&[SCMD_ADDR])
    }

    /// A bus with an arbitrary set of responding addresses.
    pub fn with_devices(addrs: &[u8]) -> Self {
        SimulatedBus {
            devices: addrs.to_vec(),
            registers: std::collections::HashMap::new(),
        }
    }

    /// Last value written to a device register, if any.
    pub fn register(&self, addr: u8, reg: u8) -> Option<u8> {
        self.registers.get(&(addr, reg)).copied()
    }

    fn check(&self, addr: u8) -> Result<(), JetbotError> {
        if self.devices.contains(&addr) {
            Ok(())
        } else {
            Err(JetbotError::I2c(format!("no device at 0x{addr:02x}")))
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cBus for SimulatedBus {
    fn read_byte(&mut self, addr: u8) -> Result<u8, JetbotError> {
        self.check(addr)?;
        Ok(0)
    }

    fn read_reg(&mut self, addr: u8, reg: u8) -> Result<u8, JetbotError> {
        self.check(addr)?;
        Ok(self.register(addr, reg).unwrap_or(0))
    }

    fn write_reg(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), JetbotError> {
        self.check(addr)?;
        self.registers.insert((addr, reg), value);
        Ok(())
    }

    fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), JetbotError> {
        self.check(addr)?;
        for (i, &byte) in data.iter().enumerate() {
            self.registers.insert((addr, reg + i as u8), byte);
        }
        Ok(())
    }
}
