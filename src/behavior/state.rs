// Behavior states and maneuver legs
use std::fmt;

/// Top-level behavior state. Maneuvers carry the leg that is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorState {
    Init,
    Idle,
    LineFollow,
    AvoidObstacle(AvoidLeg),
    ReturnHome(HomeLeg),
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviorState::Init => write!(f, "Init"),
            BehaviorState::Idle => write!(f, "Idle"),
            BehaviorState::LineFollow => write!(f, "LineFollow"),
            BehaviorState::AvoidObstacle(leg) => {
                write!(f, "AvoidObstacle({} {:?})", leg.substate(), leg)
            }
            BehaviorState::ReturnHome(leg) => write!(f, "ReturnHome({} {:?})", leg.substate(), leg),
        }
    }
}

/// Legs of the obstacle escape, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvoidLeg {
    /// Pivot clockwise off the line
    TurnAway,
    /// Straight run sideways past the obstacle's edge
    SideStep,
    /// Pivot counter-clockwise to run alongside the obstacle
    TurnParallel,
    /// Straight run along the obstacle
    PassObstacle,
    /// Pivot counter-clockwise back toward the line
    TurnBack,
    /// Straight until any channel sees the line
    SeekLine,
    /// Clockwise turn onto the line
    Rejoin,
}

impl AvoidLeg {
    /// 1-based leg number
    pub fn substate(self) -> u8 {
        match self {
            AvoidLeg::TurnAway => 1,
            AvoidLeg::SideStep => 2,
            AvoidLeg::TurnParallel => 3,
            AvoidLeg::PassObstacle => 4,
            AvoidLeg::TurnBack => 5,
            AvoidLeg::SeekLine => 6,
            AvoidLeg::Rejoin => 7,
        }
    }
}

/// Legs of the return to the start point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeLeg {
    /// Compute the reverse heading and seed the distance count
    SetHeading,
    /// Arc around onto the reverse heading
    TurnAround,
    /// Rotate in place back onto the starting heading
    Realign,
    /// Final run with speed ramp-down
    Approach,
}

impl HomeLeg {
    pub fn substate(self) -> u8 {
        match self {
            HomeLeg::SetHeading => 1,
            HomeLeg::TurnAround => 2,
            HomeLeg::Realign => 3,
            HomeLeg::Approach => 4,
        }
    }
}
