// Device boundary consumed by the navigation core
//
// Board support (or the simulator in `crate::sim`) implements these traits.
// The core never talks to registers or pins directly.

/// Size of the heading sensor calibration blob in bytes
pub const CALIBRATION_BLOB_LEN: usize = 22;

/// Error types raised at the device boundary
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Duty cycle {0}% outside [-100, 100]")]
    DutyOutOfRange(f64),

    #[error("Heading sensor fault: {0}")]
    Heading(String),
}

pub type Result<T> = std::result::Result<T, HalError>;

/// H-bridge motor channel
///
/// Positive duty drives the wheel in the robot's reverse direction. This is a
/// fact of how the wheels are mounted and is relied on by every speed reference
/// the behavior layer computes.
pub trait Motor {
    /// Set signed duty in percent. Values outside [-100, 100] are rejected.
    fn set_duty(&mut self, percent: f64) -> Result<()>;
    fn enable(&mut self) -> Result<()>;
    fn disable(&mut self) -> Result<()>;
}

/// Free-running 16-bit quadrature counter
pub trait TickCounter {
    fn count(&self) -> u16;
}

/// One-axis heading sensor
pub trait HeadingSensor {
    /// Heading in degrees, clockwise positive, in [0, 360)
    fn heading_degrees(&mut self) -> Result<f64>;
    fn read_calibration(&mut self) -> Result<[u8; CALIBRATION_BLOB_LEN]>;
    fn write_calibration(&mut self, blob: &[u8; CALIBRATION_BLOB_LEN]) -> Result<()>;
}

/// Single reflectance channel
pub trait LineChannel {
    /// Decay time in microseconds. A timed-out sample reports the cap, never an error.
    fn sample(&mut self) -> u16;
}

/// Single bump switch
pub trait BumpSwitch {
    fn is_pressed(&self) -> bool;
}

/// Anything that can report a collision
pub trait CollisionSensor {
    fn is_colliding(&self) -> bool;
}

/// Array of bump switches: any pressed switch is a collision
pub struct BumpArray {
    switches: Vec<Box<dyn BumpSwitch>>,
}

impl BumpArray {
    pub fn new(switches: Vec<Box<dyn BumpSwitch>>) -> Self {
        Self { switches }
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

impl CollisionSensor for BumpArray {
    fn is_colliding(&self) -> bool {
        self.switches.iter().any(|s| s.is_pressed())
    }
}

/// Reject duty commands outside the actuator range
pub fn check_duty(percent: f64) -> Result<f64> {
    if (-100.0..=100.0).contains(&percent) {
        Ok(percent)
    } else {
        Err(HalError::DutyOutOfRange(percent))
    }
}
