// Host-side simulation of the Romi chassis on a taped course.
//
// `SimWorld` owns the plant and hands out boxed devices that implement the
// `hal` traits, so the runtime runs unchanged against it. The world is
// advanced by the run loop through `Environment`.

mod course;
mod devices;
mod plant;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::info;

pub use course::{Course, Obstacle};
pub use devices::{BUMPER_OFFSETS, SimBumpSwitch, SimEncoder, SimImu, SimLineChannel, SimMotor};
pub use plant::{Plant, Side, TRACK_WIDTH, WHEEL_RADIUS, WheelState};

use crate::button::ButtonLatch;
use crate::hal::{BumpArray, BumpSwitch, CALIBRATION_BLOB_LEN, LineChannel};
use crate::messages::Pose;
use crate::runtime::{Devices, Environment};
use devices::{Shared, SimState};

/// How long a keyboard bump holds the center switch closed
const FORCED_BUMP_HOLD: Duration = Duration::from_millis(200);

pub struct SimWorld {
    state: Shared,
    button: ButtonLatch,
    press_at: Option<Duration>,
    bump_request: ButtonLatch,
    bump_remaining: Duration,
    elapsed: Duration,
}

impl SimWorld {
    /// Robot starts at the origin facing along the line
    pub fn new(course: Course, button: ButtonLatch) -> Self {
        Self::with_plant(course, Plant::new(0.0, 0.0, 0.0), button)
    }

    pub fn with_plant(course: Course, plant: Plant, button: ButtonLatch) -> Self {
        let state = Rc::new(RefCell::new(SimState {
            plant,
            course,
            forced_bump: false,
            imu_fault: false,
            calibration: [0; CALIBRATION_BLOB_LEN],
        }));
        Self {
            state,
            button,
            press_at: None,
            bump_request: ButtonLatch::new(),
            bump_remaining: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Press the user button once simulated time reaches `at`
    pub fn press_button_at(mut self, at: Duration) -> Self {
        self.press_at = Some(at);
        self
    }

    /// Latch that closes the center bump switch briefly when pressed
    pub fn bump_request(&self) -> ButtonLatch {
        self.bump_request.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Build the full device set over this world
    pub fn devices(&self) -> Devices {
        let switches: Vec<Box<dyn BumpSwitch>> = BUMPER_OFFSETS
            .iter()
            .map(|&lateral| Box::new(SimBumpSwitch::new(self.state.clone(), lateral)) as Box<dyn BumpSwitch>)
            .collect();

        Devices {
            left_motor: Box::new(SimMotor::new(self.state.clone(), Side::Left)),
            right_motor: Box::new(SimMotor::new(self.state.clone(), Side::Right)),
            left_encoder: Box::new(SimEncoder::new(self.state.clone(), Side::Left)),
            right_encoder: Box::new(SimEncoder::new(self.state.clone(), Side::Right)),
            imu: Box::new(SimImu::new(self.state.clone())),
            line: std::array::from_fn(|ch| {
                Box::new(SimLineChannel::new(self.state.clone(), ch)) as Box<dyn LineChannel>
            }),
            collision: Box::new(BumpArray::new(switches)),
        }
    }

    /// Make the heading sensor fail every read until cleared
    pub fn set_imu_fault(&self, fault: bool) {
        self.state.borrow_mut().imu_fault = fault;
    }

    /// Snapshot of the plant
    pub fn plant(&self) -> Plant {
        self.state.borrow().plant.clone()
    }
}

impl Environment for SimWorld {
    fn advance(&mut self, dt: Duration) {
        self.elapsed += dt;

        if let Some(at) = self.press_at
            && self.elapsed >= at
        {
            info!("Simulated button press at {:.2}s", self.elapsed.as_secs_f64());
            self.button.press();
            self.press_at = None;
        }

        if self.bump_request.take() {
            info!("Bump forced");
            self.bump_remaining = FORCED_BUMP_HOLD;
        }
        self.bump_remaining = self.bump_remaining.saturating_sub(dt);

        let mut state = self.state.borrow_mut();
        state.forced_bump = !self.bump_remaining.is_zero();
        state.plant.advance(dt.as_secs_f64());
    }

    fn pose(&self) -> Option<Pose> {
        Some(self.state.borrow().plant.pose())
    }
}
