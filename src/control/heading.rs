// Heading regulator: proportional steering around a desired heading
//
// Wheel references use the same sign convention as the speed controllers:
// a negative reference drives the wheel forward.

/// Differential wheel references produced by [`heading_control`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingCommand {
    pub right: f64,
    pub left: f64,
    /// Wrapped heading error in degrees, (-180, 180]
    pub error: f64,
    pub aligned: bool,
}

/// Map an angle difference into (-180, 180] by adding or subtracting one turn
pub fn wrap180(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else if angle <= -180.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Steer toward `desired` at forward wheel speed `velocity` (rad/s).
///
/// `aligned` is set when the error is inside `tolerance` degrees.
pub fn heading_control(
    desired: f64,
    current: f64,
    velocity: f64,
    gain: f64,
    tolerance: f64,
) -> HeadingCommand {
    let error = wrap180(desired - current);
    let output = gain * error;
    HeadingCommand {
        right: -(velocity - output),
        left: -(velocity + output),
        error,
        aligned: error.abs() < tolerance,
    }
}
