// Differential-drive plant for the Romi chassis
//
// Converts wheel duty into wheel speed (first-order lag), wheel speed into
// encoder ticks, and the wheel pair into a planar pose (forward kinematics).

use crate::config::RAD_PER_TICK;
use crate::messages::Pose;

/// Chassis geometry
pub const WHEEL_RADIUS: f64 = 0.035; // meters
pub const TRACK_WIDTH: f64 = 0.141; // meters between wheel contact points

/// Steady-state wheel speed per percent of duty (rad/s)
const MOTOR_GAIN: f64 = 0.25;
/// Motor time constant (s)
const MOTOR_TAU: f64 = 0.08;
/// Coast-down time constant with the driver disabled (s)
const COAST_TAU: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One motor + wheel + encoder
#[derive(Debug, Clone, Default)]
pub struct WheelState {
    pub duty: f64,
    pub enabled: bool,
    /// rad/s, positive = wheel reverse (same sign as the duty)
    pub speed: f64,
    /// Total encoder travel, not wrapped
    pub ticks: f64,
}

impl WheelState {
    fn advance(&mut self, dt: f64) {
        let (target, tau) = if self.enabled {
            (self.duty * MOTOR_GAIN, MOTOR_TAU)
        } else {
            (0.0, COAST_TAU)
        };
        let alpha = (dt / tau).min(1.0);
        self.speed += (target - self.speed) * alpha;
        self.ticks += self.speed * dt / RAD_PER_TICK;
    }

    /// Raw 16-bit counter value
    pub fn counter(&self) -> u16 {
        (self.ticks.round() as i64).rem_euclid(65536) as u16
    }

    /// Forward linear speed of the contact point (m/s)
    fn forward_velocity(&self) -> f64 {
        -self.speed * WHEEL_RADIUS
    }
}

#[derive(Debug, Clone, Default)]
pub struct Plant {
    pub left: WheelState,
    pub right: WheelState,
    pub x: f64,
    pub y: f64,
    /// degrees, clockwise positive, unwrapped
    pub heading: f64,
}

impl Plant {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading,
            ..Default::default()
        }
    }

    pub fn wheel(&self, side: Side) -> &WheelState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn wheel_mut(&mut self, side: Side) -> &mut WheelState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Heading as a sensor reports it, [0, 360)
    pub fn heading_reading(&self) -> f64 {
        self.heading.rem_euclid(360.0)
    }

    /// Unit vector of the direction of travel
    pub fn forward(&self) -> (f64, f64) {
        let h = self.heading.to_radians();
        (h.cos(), -h.sin())
    }

    /// Unit vector pointing out of the robot's left side
    pub fn left_side(&self) -> (f64, f64) {
        let h = self.heading.to_radians();
        (h.sin(), h.cos())
    }

    /// Point at `ahead` meters forward and `left` meters to the left of the axle center
    pub fn body_point(&self, ahead: f64, left: f64) -> (f64, f64) {
        let (fx, fy) = self.forward();
        let (lx, ly) = self.left_side();
        (
            self.x + fx * ahead + lx * left,
            self.y + fy * ahead + ly * left,
        )
    }

    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            heading: self.heading_reading(),
        }
    }

    pub fn advance(&mut self, dt: f64) {
        self.left.advance(dt);
        self.right.advance(dt);

        let v_left = self.left.forward_velocity();
        let v_right = self.right.forward_velocity();
        let v = (v_left + v_right) / 2.0;
        // left wheel faster than right turns clockwise
        let yaw_rate = (v_left - v_right) / TRACK_WIDTH;

        let (fx, fy) = self.forward();
        self.x += v * fx * dt;
        self.y += v * fy * dt;
        self.heading += yaw_rate.to_degrees() * dt;
    }
}
