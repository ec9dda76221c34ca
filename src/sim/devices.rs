// Simulated devices: every hal trait backed by the shared plant state
//
// Each device holds an `Rc<RefCell<SimState>>`. The runtime is single-threaded,
// so borrows never overlap.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::course::Course;
use super::plant::{Plant, Side};
use crate::hal::{
    self, BumpSwitch, CALIBRATION_BLOB_LEN, HalError, HeadingSensor, LineChannel, Motor,
    TickCounter, check_duty,
};
use crate::line::NUM_CHANNELS;

/// Reflectance array mount, meters ahead of the axle
const LINE_ARRAY_AHEAD: f64 = 0.07;
/// Channel pitch (m)
const LINE_CHANNEL_PITCH: f64 = 0.008;
/// Bumper mount, meters ahead of the axle
const BUMPER_AHEAD: f64 = 0.085;
/// Lateral offsets of the three bump switches (left, center, right)
pub const BUMPER_OFFSETS: [f64; 3] = [0.05, 0.0, -0.05];

pub(crate) struct SimState {
    pub plant: Plant,
    pub course: Course,
    /// Bump forced from outside (keyboard), regardless of geometry
    pub forced_bump: bool,
    /// Heading sensor stops answering while set
    pub imu_fault: bool,
    pub calibration: [u8; CALIBRATION_BLOB_LEN],
}

pub(crate) type Shared = Rc<RefCell<SimState>>;

pub struct SimMotor {
    state: Shared,
    side: Side,
}

impl SimMotor {
    pub(crate) fn new(state: Shared, side: Side) -> Self {
        Self { state, side }
    }
}

impl Motor for SimMotor {
    fn set_duty(&mut self, percent: f64) -> hal::Result<()> {
        let duty = check_duty(percent)?;
        self.state.borrow_mut().plant.wheel_mut(self.side).duty = duty;
        Ok(())
    }

    fn enable(&mut self) -> hal::Result<()> {
        self.state.borrow_mut().plant.wheel_mut(self.side).enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> hal::Result<()> {
        self.state.borrow_mut().plant.wheel_mut(self.side).enabled = false;
        Ok(())
    }
}

pub struct SimEncoder {
    state: Shared,
    side: Side,
}

impl SimEncoder {
    pub(crate) fn new(state: Shared, side: Side) -> Self {
        Self { state, side }
    }
}

impl TickCounter for SimEncoder {
    fn count(&self) -> u16 {
        self.state.borrow().plant.wheel(self.side).counter()
    }
}

/// Heading from the plant, with a stored calibration blob
pub struct SimImu {
    state: Shared,
}

impl SimImu {
    pub(crate) fn new(state: Shared) -> Self {
        Self { state }
    }
}

impl HeadingSensor for SimImu {
    fn heading_degrees(&mut self) -> hal::Result<f64> {
        let state = self.state.borrow();
        if state.imu_fault {
            return Err(HalError::Heading("no response on the sensor bus".into()));
        }
        Ok(state.plant.heading_reading())
    }

    fn read_calibration(&mut self) -> hal::Result<[u8; CALIBRATION_BLOB_LEN]> {
        Ok(self.state.borrow().calibration)
    }

    fn write_calibration(&mut self, blob: &[u8; CALIBRATION_BLOB_LEN]) -> hal::Result<()> {
        debug!("IMU calibration written: {:?}", blob);
        self.state.borrow_mut().calibration = *blob;
        Ok(())
    }
}

/// One reflectance channel.
///
/// The array is mounted reversed on this chassis: channel 0 sits on the robot's
/// right-hand side in the direction of travel, channel 7 on its left. With that
/// layout a positive line position means the line is to the robot's left and the
/// negative line gain steers back onto it.
pub struct SimLineChannel {
    state: Shared,
    lateral: f64,
}

impl SimLineChannel {
    pub(crate) fn new(state: Shared, channel: usize) -> Self {
        let center = (NUM_CHANNELS as f64 - 1.0) / 2.0;
        Self {
            state,
            lateral: (channel as f64 - center) * LINE_CHANNEL_PITCH,
        }
    }

    pub fn lateral_offset(&self) -> f64 {
        self.lateral
    }
}

impl LineChannel for SimLineChannel {
    fn sample(&mut self) -> u16 {
        let state = self.state.borrow();
        let (x, y) = state.plant.body_point(LINE_ARRAY_AHEAD, self.lateral);
        state.course.decay_at(x, y)
    }
}

pub struct SimBumpSwitch {
    state: Shared,
    lateral: f64,
}

impl SimBumpSwitch {
    pub(crate) fn new(state: Shared, lateral: f64) -> Self {
        Self { state, lateral }
    }
}

impl BumpSwitch for SimBumpSwitch {
    fn is_pressed(&self) -> bool {
        let state = self.state.borrow();
        if state.forced_bump && self.lateral == 0.0 {
            return true;
        }
        let (x, y) = state.plant.body_point(BUMPER_AHEAD, self.lateral);
        state.course.is_blocked(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(course: Course, plant: Plant) -> Shared {
        Rc::new(RefCell::new(SimState {
            plant,
            course,
            forced_bump: false,
            imu_fault: false,
            calibration: [0; CALIBRATION_BLOB_LEN],
        }))
    }

    #[test]
    fn test_motor_rejects_out_of_range_duty() {
        let state = shared(Course::straight(1.0), Plant::default());
        let mut motor = SimMotor::new(state.clone(), Side::Left);
        assert!(motor.set_duty(120.0).is_err());
        assert!(motor.set_duty(-60.0).is_ok());
        assert_eq!(state.borrow().plant.left.duty, -60.0);
    }

    #[test]
    fn test_channel_layout() {
        let state = shared(Course::straight(1.0), Plant::default());
        let first = SimLineChannel::new(state.clone(), 0);
        let last = SimLineChannel::new(state, NUM_CHANNELS - 1);
        assert!(first.lateral_offset() < 0.0);
        assert!(last.lateral_offset() > 0.0);
        assert!((first.lateral_offset() + last.lateral_offset()).abs() < 1e-12);
    }

    #[test]
    fn test_line_under_center_channels() {
        let state = shared(Course::straight(1.0), Plant::new(0.2, 0.0, 0.0));
        let mut center = SimLineChannel::new(state.clone(), 3);
        let mut outer = SimLineChannel::new(state, 0);
        assert_eq!(center.sample(), crate::config::LINE_MAX_DECAY_US);
        assert!(outer.sample() < 1000);
    }

    #[test]
    fn test_bump_switch_hits_obstacle() {
        let state = shared(Course::with_obstacle(2.0, 1.0), Plant::new(0.9, 0.0, 0.0));
        let center = SimBumpSwitch::new(state.clone(), 0.0);
        assert!(center.is_pressed());

        state.borrow_mut().plant.x = 0.5;
        assert!(!center.is_pressed());
        state.borrow_mut().forced_bump = true;
        assert!(center.is_pressed());
    }

    #[test]
    fn test_imu_calibration_storage() {
        let state = shared(Course::straight(1.0), Plant::new(0.0, 0.0, -30.0));
        let mut imu = SimImu::new(state);
        assert!((imu.heading_degrees().unwrap() - 330.0).abs() < 1e-9);
        imu.write_calibration(&[5; CALIBRATION_BLOB_LEN]).unwrap();
        assert_eq!(imu.read_calibration().unwrap(), [5; CALIBRATION_BLOB_LEN]);
    }

    #[test]
    fn test_imu_fault_reports_heading_error() {
        let state = shared(Course::straight(1.0), Plant::default());
        let mut imu = SimImu::new(state.clone());
        state.borrow_mut().imu_fault = true;
        assert!(matches!(imu.heading_degrees(), Err(HalError::Heading(_))));
        state.borrow_mut().imu_fault = false;
        assert!(imu.heading_degrees().is_ok());
    }
}
