// Values passed between the behavior layer, the runtime and the simulator

use serde::{Deserialize, Serialize};

use crate::control::HeadingCommand;

// Wheel speed references from the behavior step -> speed controllers
// rad/s per wheel, negative = wheel forward
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct WheelSpeeds {
    pub right: f64,
    pub left: f64,
}

impl WheelSpeeds {
    pub fn new(right: f64, left: f64) -> Self {
        Self { right, left }
    }

    pub fn stop() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.right == 0.0 && self.left == 0.0
    }
}

// Builds the wheel pair straight out of a heading regulator result
impl From<&HeadingCommand> for WheelSpeeds {
    fn from(cmd: &HeadingCommand) -> Self {
        Self {
            right: cmd.right,
            left: cmd.left,
        }
    }
}

/// Simulated robot pose reported at the end of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Pose {
    /// meters
    pub x: f64,
    pub y: f64,
    /// degrees, clockwise positive, [0, 360)
    pub heading: f64,
}

/// Summary logged when the runtime stops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub elapsed_s: f64,
    pub final_state: String,
    pub maneuvers_completed: u32,
    pub pose: Option<Pose>,
}
