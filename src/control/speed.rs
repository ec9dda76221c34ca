// PI wheel speed controller.
//
// One controller owns one motor and the odometry channel of the same wheel.
// The scheduler updates the odometry first, then calls `SpeedController::update`
// in the same pass so the measured speed is always current.

use std::time::Duration;

use tracing::debug;

use crate::config::{RAD_PER_TICK, SpeedGains};
use crate::hal::{Motor, Result};
use crate::odometry::OdometryChannel;

/// Output clamp in duty percent
const OUTPUT_LIMIT: f64 = 100.0;

pub struct SpeedController {
    name: &'static str,
    motor: Box<dyn Motor>,
    odometry: OdometryChannel,

    kp: f64,
    ki: f64,

    /// Reference wheel speed (rad/s), positive = wheel reverse
    reference: f64,
    measured: f64,
    integral: f64,
    output: f64,

    /// Encoder sampling period used to turn a tick delta into rad/s
    encoder_period: Duration,
    /// dt used for the first step, before any timestamp is known
    nominal_period: Duration,
    last_tick: Option<Duration>,
    enabled: bool,
}

impl SpeedController {
    pub fn new(
        name: &'static str,
        motor: Box<dyn Motor>,
        odometry: OdometryChannel,
        gains: &SpeedGains,
        encoder_period: Duration,
        nominal_period: Duration,
    ) -> Self {
        Self {
            name,
            motor,
            odometry,
            kp: gains.kp,
            ki: gains.ki,
            reference: 0.0,
            measured: 0.0,
            integral: 0.0,
            output: 0.0,
            encoder_period,
            nominal_period,
            last_tick: None,
            enabled: false,
        }
    }

    /// Set the reference wheel speed in rad/s. Takes effect on the next step.
    pub fn set_speed(&mut self, reference: f64) {
        self.reference = reference;
    }

    pub fn reference(&self) -> f64 {
        self.reference
    }

    pub fn measured_speed(&self) -> f64 {
        self.measured
    }

    pub fn integral_error(&self) -> f64 {
        self.integral
    }

    /// Last duty written to the motor
    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cumulative encoder ticks of this wheel
    pub fn encoder_position(&self) -> i32 {
        self.odometry.position()
    }

    pub fn odometry(&self) -> &OdometryChannel {
        &self.odometry
    }

    pub fn odometry_mut(&mut self) -> &mut OdometryChannel {
        &mut self.odometry
    }

    /// Run one control step at monotonic time `now`.
    ///
    /// dt is the time since the previous call; the very first call uses the
    /// nominal controller period.
    pub fn update(&mut self, now: Duration) -> Result<()> {
        let dt = match self.last_tick {
            Some(last) => now.saturating_sub(last),
            None => self.nominal_period,
        };
        self.last_tick = Some(now);
        self.step(dt.as_secs_f64())
    }

    /// Run one control step with an explicit dt in seconds
    pub fn step(&mut self, dt: f64) -> Result<()> {
        self.measured = self.odometry.delta() as f64 * RAD_PER_TICK / self.encoder_period.as_secs_f64();

        if self.reference == 0.0 {
            self.integral = 0.0;
            self.output = 0.0;
            if self.enabled {
                debug!("{} wheel: zero reference, disabling motor", self.name);
            }
            self.enabled = false;
            self.motor.disable()?;
            return self.motor.set_duty(0.0);
        }

        if !self.enabled {
            debug!("{} wheel: enabling motor", self.name);
        }
        self.enabled = true;
        self.motor.enable()?;

        let error = self.reference - self.measured;
        // clamp-only anti-windup: the integrator is bounded by the zero-reference reset
        self.integral += error * dt;
        self.output = (self.kp * error + self.ki * self.integral).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);

        self.motor.set_duty(self.output)
    }

    /// Disable the motor regardless of reference
    pub fn shutdown(&mut self) -> Result<()> {
        self.reference = 0.0;
        self.integral = 0.0;
        self.output = 0.0;
        self.enabled = false;
        self.motor.set_duty(0.0)?;
        self.motor.disable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{TickCounter, check_duty};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct MotorLog {
        duties: Vec<f64>,
        enabled: bool,
    }

    struct FakeMotor(Rc<RefCell<MotorLog>>);

    impl Motor for FakeMotor {
        fn set_duty(&mut self, percent: f64) -> Result<()> {
            check_duty(percent)?;
            self.0.borrow_mut().duties.push(percent);
            Ok(())
        }
        fn enable(&mut self) -> Result<()> {
            self.0.borrow_mut().enabled = true;
            Ok(())
        }
        fn disable(&mut self) -> Result<()> {
            self.0.borrow_mut().enabled = false;
            Ok(())
        }
    }

    struct FakeCounter(Rc<Cell<u16>>);

    impl TickCounter for FakeCounter {
        fn count(&self) -> u16 {
            self.0.get()
        }
    }

    fn controller() -> (SpeedController, Rc<RefCell<MotorLog>>, Rc<Cell<u16>>) {
        let log = Rc::new(RefCell::new(MotorLog::default()));
        let raw = Rc::new(Cell::new(0u16));
        let odometry = OdometryChannel::new(Box::new(FakeCounter(raw.clone())));
        let ctrl = SpeedController::new(
            "test",
            Box::new(FakeMotor(log.clone())),
            odometry,
            &SpeedGains::default(),
            Duration::from_millis(20),
            Duration::from_millis(20),
        );
        (ctrl, log, raw)
    }

    #[test]
    fn test_zero_reference_disables_and_holds_integral() {
        let (mut ctrl, log, raw) = controller();
        // wheel being pushed around while the reference is zero
        for i in 0..20u16 {
            raw.set(i.wrapping_mul(97));
            ctrl.odometry_mut().update();
            ctrl.step(0.02).unwrap();
            assert_eq!(ctrl.output(), 0.0);
            assert_eq!(ctrl.integral_error(), 0.0);
        }
        assert!(!log.borrow().enabled);
        assert!(log.borrow().duties.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_pi_output_first_step() {
        let (mut ctrl, log, _raw) = controller();
        ctrl.set_speed(2.0);
        ctrl.odometry_mut().update();
        ctrl.step(0.02).unwrap();
        // error 2, integral 0.04 -> 7*2 + 7*0.04
        assert!((ctrl.output() - 14.28).abs() < 1e-9, "got {}", ctrl.output());
        assert!(log.borrow().enabled);
        assert!(ctrl.is_enabled());
    }

    #[test]
    fn test_output_is_clamped() {
        let (mut ctrl, _log, _raw) = controller();
        ctrl.set_speed(-50.0);
        for _ in 0..100 {
            ctrl.odometry_mut().update();
            ctrl.step(0.02).unwrap();
            assert!(ctrl.output() >= -100.0 && ctrl.output() <= 100.0);
        }
        assert_eq!(ctrl.output(), -100.0);
        // integral keeps winding; only the output is clamped
        assert!(ctrl.integral_error() < -90.0);
    }

    #[test]
    fn test_measured_speed_from_delta() {
        let (mut ctrl, _log, raw) = controller();
        ctrl.set_speed(1.0);
        raw.set(72); // 72 ticks in 20 ms = 1/20 rev per 20 ms
        ctrl.odometry_mut().update();
        ctrl.step(0.02).unwrap();
        let expected = 72.0 * RAD_PER_TICK / 0.02;
        assert!((ctrl.measured_speed() - expected).abs() < 1e-9);
        assert_eq!(ctrl.encoder_position(), 72);
    }

    #[test]
    fn test_reference_change_resets_integral_on_zero() {
        let (mut ctrl, _log, _raw) = controller();
        ctrl.set_speed(3.0);
        for _ in 0..5 {
            ctrl.step(0.02).unwrap();
        }
        assert!(ctrl.integral_error() > 0.0);
        ctrl.set_speed(0.0);
        ctrl.step(0.02).unwrap();
        assert_eq!(ctrl.integral_error(), 0.0);
        ctrl.set_speed(3.0);
        ctrl.step(0.02).unwrap();
        assert!((ctrl.integral_error() - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_first_update_uses_nominal_period() {
        let (mut ctrl, _log, _raw) = controller();
        ctrl.set_speed(1.0);
        ctrl.update(Duration::from_secs(5)).unwrap();
        assert!((ctrl.integral_error() - 0.02).abs() < 1e-9);
        ctrl.update(Duration::from_millis(5040)).unwrap();
        assert!((ctrl.integral_error() - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_shutdown_disables() {
        let (mut ctrl, log, _raw) = controller();
        ctrl.set_speed(4.0);
        ctrl.step(0.02).unwrap();
        ctrl.shutdown().unwrap();
        assert!(!log.borrow().enabled);
        assert_eq!(ctrl.reference(), 0.0);
        assert_eq!(*log.borrow().duties.last().unwrap(), 0.0);
    }
}
