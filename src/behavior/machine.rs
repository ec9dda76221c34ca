// Behavior state machine
//
// All state lives in fields so each call resumes where the last one stopped.
// Within one step a completed leg falls through into the next leg of the same
// maneuver; moving between top-level states always takes effect on the next step.

use tracing::{debug, info};

use super::state::{AvoidLeg, BehaviorState, HomeLeg};
use crate::config::BehaviorConfig;
use crate::control::{HeadingCommand, heading_control, wrap180};
use crate::hal::Result;
use crate::line::LinePosition;
use crate::messages::WheelSpeeds;

/// Inputs the behavior layer reads each step
pub trait NavSensors {
    /// Current heading, degrees clockwise in [0, 360)
    fn heading(&mut self) -> Result<f64>;
    /// Sample the line array
    fn line_position(&mut self) -> LinePosition;
    fn is_colliding(&mut self) -> bool;
    /// Whether a start press is waiting, without clearing it
    fn button_pending(&self) -> bool;
    /// Read-and-clear the start button
    fn take_button_press(&mut self) -> bool;
    /// Cumulative ticks of the left wheel (forward travel is negative)
    fn left_encoder_position(&self) -> i32;
}

pub struct BehaviorStateMachine {
    config: BehaviorConfig,
    state: BehaviorState,

    starting_heading: f64,
    obstacle_passed: bool,
    settle_count: u32,

    // per-leg accumulators, zeroed on every leg change
    total_heading_change: f64,
    total_position_change: i32,
    previous_heading: f64,
    previous_position: i32,
    straight_heading: f64,
    home_heading: f64,

    command: WheelSpeeds,
    maneuvers_completed: u32,
}

impl BehaviorStateMachine {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            config,
            state: BehaviorState::Init,
            starting_heading: 0.0,
            obstacle_passed: false,
            settle_count: 0,
            total_heading_change: 0.0,
            total_position_change: 0,
            previous_heading: 0.0,
            previous_position: 0,
            straight_heading: 0.0,
            home_heading: 0.0,
            command: WheelSpeeds::stop(),
            maneuvers_completed: 0,
        }
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    /// Wheel references the speed controllers should track
    pub fn command(&self) -> WheelSpeeds {
        self.command
    }

    pub fn starting_heading(&self) -> f64 {
        self.starting_heading
    }

    pub fn obstacle_passed(&self) -> bool {
        self.obstacle_passed
    }

    /// Reverse heading used on the first return leg
    pub fn home_heading(&self) -> f64 {
        self.home_heading
    }

    pub fn total_heading_change(&self) -> f64 {
        self.total_heading_change
    }

    /// Forward ticks covered in the current leg
    pub fn forward_ticks(&self) -> i32 {
        -self.total_position_change
    }

    /// Number of return-home runs finished since start
    pub fn maneuvers_completed(&self) -> u32 {
        self.maneuvers_completed
    }

    /// Advance the state machine by one behavior period
    pub fn step(&mut self, sensors: &mut dyn NavSensors) -> Result<()> {
        match self.state {
            BehaviorState::Init => self.transition(BehaviorState::Idle),
            BehaviorState::Idle => self.idle(sensors)?,
            BehaviorState::LineFollow => self.line_follow(sensors)?,
            BehaviorState::AvoidObstacle(_) => {
                while let BehaviorState::AvoidObstacle(leg) = self.state {
                    if !self.avoid_leg(leg, sensors)? {
                        break;
                    }
                }
            }
            BehaviorState::ReturnHome(_) => {
                while let BehaviorState::ReturnHome(leg) = self.state {
                    if !self.home_leg(leg, sensors)? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: BehaviorState) {
        info!("Behavior: {} -> {}", self.state, next);
        self.state = next;
    }

    fn idle(&mut self, sensors: &mut dyn NavSensors) -> Result<()> {
        // the press stays latched until the heading read succeeds
        if sensors.button_pending() {
            let heading = sensors.heading()?;
            sensors.take_button_press();
            self.starting_heading = heading;
            self.settle_count = 0;
            info!("Start pressed, starting heading {:.2}", self.starting_heading);
            self.transition(BehaviorState::LineFollow);
        }
        Ok(())
    }

    fn line_follow(&mut self, sensors: &mut dyn NavSensors) -> Result<()> {
        let tuning = &self.config.line_follow;
        let position = sensors.line_position();

        let settling = self.settle_count < tuning.settle_periods;
        if settling {
            self.settle_count += 1;
        }

        if !settling && position.is_cross_line() {
            if self.obstacle_passed {
                self.reset_accumulators();
                self.transition(BehaviorState::ReturnHome(HomeLeg::SetHeading));
            } else {
                // finish bar before the obstacle: keep going straight
                self.drive_line(0.0);
            }
        } else {
            let correction = if settling {
                0.0
            } else {
                position.value() * tuning.gain
            };
            self.drive_line(correction);
        }

        if sensors.is_colliding() && !self.obstacle_passed {
            info!("Collision detected, starting escape");
            self.previous_heading = self.starting_heading;
            self.reset_accumulators();
            self.transition(BehaviorState::AvoidObstacle(AvoidLeg::TurnAway));
        }
        Ok(())
    }

    fn drive_line(&mut self, correction: f64) {
        let speed = self.config.line_follow.nominal_speed;
        self.command = WheelSpeeds::new(-(speed - correction), -(speed + correction));
    }

    /// Run one escape leg. Returns true when the leg finished this step.
    fn avoid_leg(&mut self, leg: AvoidLeg, sensors: &mut dyn NavSensors) -> Result<bool> {
        let m = self.config.avoid.clone();
        let heading = sensors.heading()?;

        let done = match leg {
            AvoidLeg::TurnAway => {
                self.accumulate_heading(heading);
                if self.total_heading_change < m.turn_away_deg {
                    self.command = WheelSpeeds::new(m.turn_speed, 0.0);
                    false
                } else {
                    true
                }
            }
            AvoidLeg::SideStep | AvoidLeg::PassObstacle => {
                let target = if leg == AvoidLeg::SideStep {
                    m.side_step_ticks
                } else {
                    m.pass_ticks
                };
                self.accumulate_distance(sensors.left_encoder_position());
                if self.forward_ticks() < target {
                    self.steer(self.straight_heading, heading, m.straight_speed, None);
                    false
                } else {
                    true
                }
            }
            AvoidLeg::TurnParallel | AvoidLeg::TurnBack => {
                let target = if leg == AvoidLeg::TurnParallel {
                    m.turn_parallel_deg
                } else {
                    m.turn_back_deg
                };
                self.accumulate_heading(heading);
                if self.total_heading_change > target {
                    self.command = WheelSpeeds::new(-m.turn_speed, 0.0);
                    false
                } else {
                    true
                }
            }
            AvoidLeg::SeekLine => {
                if !sensors.line_position().is_detected() {
                    self.steer(self.straight_heading, heading, m.straight_speed, None);
                    false
                } else {
                    true
                }
            }
            AvoidLeg::Rejoin => {
                self.accumulate_heading(heading);
                if self.total_heading_change < m.rejoin_turn_deg {
                    self.command = WheelSpeeds::new(m.turn_speed, -m.turn_speed);
                    false
                } else {
                    true
                }
            }
        };

        if !done {
            return Ok(false);
        }

        info!(
            "Escape leg {} {:?} done (heading {:.1}, {} ticks)",
            leg.substate(),
            leg,
            heading,
            self.forward_ticks()
        );
        self.reset_accumulators();
        self.previous_heading = heading;
        self.previous_position = sensors.left_encoder_position();

        let next = match leg {
            AvoidLeg::TurnAway => Some(AvoidLeg::SideStep),
            AvoidLeg::SideStep => Some(AvoidLeg::TurnParallel),
            AvoidLeg::TurnParallel => Some(AvoidLeg::PassObstacle),
            AvoidLeg::PassObstacle => Some(AvoidLeg::TurnBack),
            AvoidLeg::TurnBack => Some(AvoidLeg::SeekLine),
            AvoidLeg::SeekLine => Some(AvoidLeg::Rejoin),
            AvoidLeg::Rejoin => None,
        };
        match next {
            Some(next) => {
                if matches!(next, AvoidLeg::SideStep | AvoidLeg::PassObstacle | AvoidLeg::SeekLine) {
                    self.straight_heading = heading;
                }
                self.state = BehaviorState::AvoidObstacle(next);
            }
            None => {
                self.obstacle_passed = true;
                self.transition(BehaviorState::LineFollow);
            }
        }
        Ok(true)
    }

    /// Run one return leg. Returns true when the leg finished this step.
    fn home_leg(&mut self, leg: HomeLeg, sensors: &mut dyn NavSensors) -> Result<bool> {
        let h = self.config.return_home.clone();

        match leg {
            HomeLeg::SetHeading => {
                self.home_heading = (self.starting_heading + 180.0).rem_euclid(360.0);
                self.previous_position = sensors.left_encoder_position();
                self.total_position_change = 0;
                info!("Returning home, reverse heading {:.2}", self.home_heading);
                self.state = BehaviorState::ReturnHome(HomeLeg::TurnAround);
                Ok(true)
            }
            HomeLeg::TurnAround => {
                let heading = sensors.heading()?;
                self.accumulate_distance(sensors.left_encoder_position());
                if self.forward_ticks() < h.turn_around_ticks {
                    self.steer(self.home_heading, heading, h.turn_around_speed, None);
                    return Ok(false);
                }
                debug!("Turn-around done at heading {:.1}", heading);
                self.reset_accumulators();
                self.state = BehaviorState::ReturnHome(HomeLeg::Realign);
                Ok(true)
            }
            HomeLeg::Realign => {
                let heading = sensors.heading()?;
                let cmd = self.steer(self.starting_heading, heading, 0.0, Some(h.realign_gain));
                if !cmd.aligned {
                    return Ok(false);
                }
                debug!("Realigned to {:.2}", self.starting_heading);
                self.reset_accumulators();
                self.previous_position = sensors.left_encoder_position();
                self.state = BehaviorState::ReturnHome(HomeLeg::Approach);
                Ok(true)
            }
            HomeLeg::Approach => {
                let heading = sensors.heading()?;
                self.accumulate_distance(sensors.left_encoder_position());
                let covered = self.forward_ticks() as f64;
                let total = h.approach_ticks as f64;
                let profile = h
                    .approach_profiles
                    .iter()
                    .find(|p| covered < p.until_fraction * total);

                if let Some(p) = profile {
                    self.steer(self.starting_heading, heading, p.speed, Some(p.gain));
                    return Ok(false);
                }

                self.command = WheelSpeeds::stop();
                self.obstacle_passed = false;
                self.reset_accumulators();
                self.maneuvers_completed += 1;
                info!("Home reached after {} ticks", covered);
                self.transition(BehaviorState::Idle);
                Ok(true)
            }
        }
    }

    fn steer(&mut self, desired: f64, current: f64, velocity: f64, gain: Option<f64>) -> HeadingCommand {
        let tuning = &self.config.heading;
        let cmd = heading_control(
            desired,
            current,
            velocity,
            gain.unwrap_or(tuning.default_gain),
            tuning.tolerance_deg,
        );
        self.command = WheelSpeeds::from(&cmd);
        cmd
    }

    fn accumulate_heading(&mut self, current: f64) {
        let delta = wrap180(current - self.previous_heading);
        self.previous_heading = current;
        self.total_heading_change += delta;
    }

    fn accumulate_distance(&mut self, position: i32) {
        let delta = position.wrapping_sub(self.previous_position);
        self.previous_position = position;
        self.total_position_change += delta;
    }

    fn reset_accumulators(&mut self) {
        self.total_heading_change = 0.0;
        self.total_position_change = 0;
    }
}
