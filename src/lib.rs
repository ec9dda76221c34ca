// Navigation control core for a two-wheel line-following robot
//
// Modules, leaf-first:
// - odometry: wrap-corrected tick counting
// - control: PI wheel speed loop and heading regulator
// - line: calibrated line-position estimator
// - behavior: line follow / obstacle avoidance / return home state machine
// - runtime: cooperative scheduler tying the pieces together
// - sim: host-side plant implementing every device trait

pub mod behavior;
pub mod button;
pub mod config;
pub mod control;
pub mod hal;
pub mod imu_calibration;
pub mod keyboard;
pub mod line;
pub mod messages;
pub mod odometry;
pub mod runtime;
pub mod sim;
