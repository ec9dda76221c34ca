// Cooperative scheduler
//
// One base tick per controller period. Within a tick the order is fixed:
// odometry -> wheel speed controllers -> (every Nth tick) behavior step.
// Wheel references produced by a behavior step are applied at the end of the
// same tick and take effect on the next controller update.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::behavior::{BehaviorState, BehaviorStateMachine, NavSensors};
use crate::button::ButtonLatch;
use crate::config::{ConfigError, NavConfig, Timing};
use crate::control::SpeedController;
use crate::hal::{self, CollisionSensor, HalError, HeadingSensor, LineChannel, Motor, TickCounter};
use crate::imu_calibration::CalibrationError;
use crate::line::{LinePosition, LinePositionEstimator, NUM_CHANNELS};
use crate::messages::{Pose, RunSummary};
use crate::odometry::OdometryChannel;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Device error: {0}")]
    Hal(#[from] HalError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Everything the runtime drives or reads
pub struct Devices {
    pub left_motor: Box<dyn Motor>,
    pub right_motor: Box<dyn Motor>,
    pub left_encoder: Box<dyn TickCounter>,
    pub right_encoder: Box<dyn TickCounter>,
    pub imu: Box<dyn HeadingSensor>,
    /// Ordered left to right
    pub line: [Box<dyn LineChannel>; NUM_CHANNELS],
    pub collision: Box<dyn CollisionSensor>,
}

/// World the robot lives in. Advanced once per base tick by the run loop.
pub trait Environment {
    fn advance(&mut self, dt: Duration);

    /// Ground-truth pose, if the environment knows it
    fn pose(&self) -> Option<Pose> {
        None
    }
}

/// Sensor view handed to the behavior step
struct Senses<'a> {
    imu: &'a mut dyn HeadingSensor,
    line: &'a mut LinePositionEstimator,
    collision: &'a dyn CollisionSensor,
    button: &'a ButtonLatch,
    left_position: i32,
}

impl NavSensors for Senses<'_> {
    fn heading(&mut self) -> hal::Result<f64> {
        self.imu.heading_degrees()
    }

    fn line_position(&mut self) -> LinePosition {
        self.line.update()
    }

    fn is_colliding(&mut self) -> bool {
        self.collision.is_colliding()
    }

    fn button_pending(&self) -> bool {
        self.button.is_pending()
    }

    fn take_button_press(&mut self) -> bool {
        self.button.take()
    }

    fn left_encoder_position(&self) -> i32 {
        self.left_position
    }
}

pub struct Runtime {
    timing: Timing,
    left: SpeedController,
    right: SpeedController,
    imu: Box<dyn HeadingSensor>,
    line: LinePositionEstimator,
    collision: Box<dyn CollisionSensor>,
    button: ButtonLatch,
    behavior: BehaviorStateMachine,
    ticks: u64,
    stopped: bool,
}

impl Runtime {
    /// Build the runtime over a device set. The config is validated first; a
    /// behavior period that is not a whole multiple of the controller period is
    /// rejected here.
    pub fn new(config: &NavConfig, devices: Devices, button: ButtonLatch) -> Result<Self, ConfigError> {
        config.validate()?;

        let encoder_period = config.timing.encoder_period();
        let controller_period = config.timing.controller_period();

        let left = SpeedController::new(
            "left",
            devices.left_motor,
            OdometryChannel::new(devices.left_encoder),
            &config.speed,
            encoder_period,
            controller_period,
        );
        let right = SpeedController::new(
            "right",
            devices.right_motor,
            OdometryChannel::new(devices.right_encoder),
            &config.speed,
            encoder_period,
            controller_period,
        );

        Ok(Self {
            timing: config.timing.clone(),
            left,
            right,
            imu: devices.imu,
            line: LinePositionEstimator::new(devices.line),
            collision: devices.collision,
            button,
            behavior: BehaviorStateMachine::new(config.behavior.clone()),
            ticks: 0,
            stopped: false,
        })
    }

    /// Base tick period
    pub fn period(&self) -> Duration {
        self.timing.controller_period()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn state(&self) -> BehaviorState {
        self.behavior.state()
    }

    pub fn behavior(&self) -> &BehaviorStateMachine {
        &self.behavior
    }

    pub fn left(&self) -> &SpeedController {
        &self.left
    }

    pub fn right(&self) -> &SpeedController {
        &self.right
    }

    pub fn imu_mut(&mut self) -> &mut dyn HeadingSensor {
        self.imu.as_mut()
    }

    /// Run one base tick at monotonic time `now`.
    ///
    /// All three stages run even if an earlier one fails; the first error is
    /// returned.
    pub fn tick(&mut self, now: Duration) -> Result<(), HalError> {
        self.left.odometry_mut().update();
        self.right.odometry_mut().update();

        let left = self.left.update(now);
        let right = self.right.update(now);

        let behavior = if self.ticks % self.timing.behavior_divider() == 0 {
            self.step_behavior()
        } else {
            Ok(())
        };

        self.ticks += 1;
        left.and(right).and(behavior)
    }

    fn step_behavior(&mut self) -> Result<(), HalError> {
        let mut senses = Senses {
            imu: self.imu.as_mut(),
            line: &mut self.line,
            collision: self.collision.as_ref(),
            button: &self.button,
            left_position: self.left.encoder_position(),
        };
        let result = self.behavior.step(&mut senses);

        // references still apply on a failed step: the machine leaves its last command in place
        let cmd = self.behavior.command();
        self.left.set_speed(cmd.left);
        self.right.set_speed(cmd.right);
        debug!("Wheel references: right {:.3}, left {:.3}", cmd.right, cmd.left);

        result
    }

    /// Stop both wheels and disable the drivers
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        self.stopped = true;
        let left = self.left.shutdown();
        let right = self.right.shutdown();
        info!("Motors disabled");
        left.and(right)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.stopped
            && let Err(e) = self.shutdown()
        {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

/// Run loop options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this much (real or simulated) time
    pub duration: Option<Duration>,
    /// Pace ticks against the wall clock. Otherwise simulated time advances
    /// one period per tick as fast as possible.
    pub realtime: bool,
    /// Stop once this many return-home maneuvers have completed
    pub stop_after_maneuvers: Option<u32>,
    /// Set from outside (keyboard) to end the run
    pub quit: Option<Arc<AtomicBool>>,
}

pub async fn run(
    runtime: &mut Runtime,
    env: &mut dyn Environment,
    options: RunOptions,
) -> Result<RunSummary, RuntimeError> {
    let period = runtime.period();
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        "Runtime started: {}ms base tick, behavior every {} ticks, {}",
        period.as_millis(),
        runtime.timing.behavior_divider(),
        if options.realtime { "realtime" } else { "fast" }
    );

    let started = Instant::now();
    let mut now = Duration::ZERO;
    let mut hal_errors = 0u64;

    loop {
        if options.realtime {
            tokio::select! {
                _ = tick.tick() => {}
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, stopping");
                    break;
                }
            }
            let wall = started.elapsed();
            env.advance(wall.saturating_sub(now));
            now = wall;
        } else {
            tokio::select! {
                biased;
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, stopping");
                    break;
                }
                _ = tokio::task::yield_now() => {}
            }
            now += period;
            env.advance(period);
        }

        if let Err(e) = runtime.tick(now) {
            hal_errors += 1;
            warn!("Tick {} failed: {}", runtime.ticks(), e);
        }

        if options.quit.as_ref().is_some_and(|q| q.load(Ordering::Relaxed)) {
            info!("Quit requested");
            break;
        }
        if options.duration.is_some_and(|d| now >= d) {
            info!("Run time limit reached");
            break;
        }
        if options
            .stop_after_maneuvers
            .is_some_and(|n| runtime.behavior().maneuvers_completed() >= n)
        {
            info!("Maneuver count reached");
            break;
        }
    }

    runtime.shutdown()?;

    if hal_errors > 0 {
        warn!("{} ticks reported device errors", hal_errors);
    }

    Ok(RunSummary {
        ticks: runtime.ticks(),
        elapsed_s: now.as_secs_f64(),
        final_state: runtime.state().to_string(),
        maneuvers_completed: runtime.behavior().maneuvers_completed(),
        pose: env.pose(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::hal::CALIBRATION_BLOB_LEN;

    #[derive(Default)]
    struct MotorLog {
        enabled: bool,
        duty: f64,
        enables: u32,
    }

    struct FakeMotor(Rc<RefCell<MotorLog>>);

    impl Motor for FakeMotor {
        fn set_duty(&mut self, percent: f64) -> hal::Result<()> {
            hal::check_duty(percent)?;
            self.0.borrow_mut().duty = percent;
            Ok(())
        }
        fn enable(&mut self) -> hal::Result<()> {
            let mut log = self.0.borrow_mut();
            log.enabled = true;
            log.enables += 1;
            Ok(())
        }
        fn disable(&mut self) -> hal::Result<()> {
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

    struct FakeImu(Rc<Cell<f64>>);

    impl HeadingSensor for FakeImu {
        fn heading_degrees(&mut self) -> hal::Result<f64> {
            Ok(self.0.get())
        }
        fn read_calibration(&mut self) -> hal::Result<[u8; CALIBRATION_BLOB_LEN]> {
            Ok([0; CALIBRATION_BLOB_LEN])
        }
        fn write_calibration(&mut self, _blob: &[u8; CALIBRATION_BLOB_LEN]) -> hal::Result<()> {
            Ok(())
        }
    }

    struct FakeChannel(Rc<Cell<u16>>);

    impl LineChannel for FakeChannel {
        fn sample(&mut self) -> u16 {
            self.0.get()
        }
    }

    struct FakeBumper(Rc<Cell<bool>>);

    impl CollisionSensor for FakeBumper {
        fn is_colliding(&self) -> bool {
            self.0.get()
        }
    }

    struct Rig {
        runtime: Runtime,
        button: ButtonLatch,
        left_motor: Rc<RefCell<MotorLog>>,
        right_motor: Rc<RefCell<MotorLog>>,
        heading: Rc<Cell<f64>>,
    }

    fn fake_devices(
        left_motor: &Rc<RefCell<MotorLog>>,
        right_motor: &Rc<RefCell<MotorLog>>,
        heading: &Rc<Cell<f64>>,
    ) -> Devices {
        // floor everywhere
        let floor = Rc::new(Cell::new(200u16));
        Devices {
            left_motor: Box::new(FakeMotor(left_motor.clone())),
            right_motor: Box::new(FakeMotor(right_motor.clone())),
            left_encoder: Box::new(FakeCounter(Rc::new(Cell::new(0)))),
            right_encoder: Box::new(FakeCounter(Rc::new(Cell::new(0)))),
            imu: Box::new(FakeImu(heading.clone())),
            line: std::array::from_fn(|_| Box::new(FakeChannel(floor.clone())) as Box<dyn LineChannel>),
            collision: Box::new(FakeBumper(Rc::new(Cell::new(false)))),
        }
    }

    fn rig() -> Rig {
        let left_motor = Rc::new(RefCell::new(MotorLog::default()));
        let right_motor = Rc::new(RefCell::new(MotorLog::default()));
        let heading = Rc::new(Cell::new(90.0));
        let devices = fake_devices(&left_motor, &right_motor, &heading);
        let button = ButtonLatch::new();
        Rig {
            runtime: Runtime::new(&NavConfig::default(), devices, button.clone()).unwrap(),
            button,
            left_motor,
            right_motor,
            heading,
        }
    }

    fn at(tick: u64) -> Duration {
        Duration::from_millis(20 * tick)
    }

    #[test]
    fn test_rejects_behavior_period_shorter_than_controller() {
        let motor = Rc::new(RefCell::new(MotorLog::default()));
        let mut config = NavConfig::default();
        config.timing.behavior_period_ms = 10;
        let devices = fake_devices(&motor, &motor, &Rc::new(Cell::new(0.0)));
        assert!(matches!(
            Runtime::new(&config, devices, ButtonLatch::new()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_init_then_idle_with_motors_off() {
        let mut rig = rig();
        assert_eq!(rig.runtime.state(), BehaviorState::Init);

        rig.runtime.tick(at(0)).unwrap();
        assert_eq!(rig.runtime.state(), BehaviorState::Idle);

        for t in 1..20 {
            rig.runtime.tick(at(t)).unwrap();
        }
        assert_eq!(rig.runtime.state(), BehaviorState::Idle);
        assert!(!rig.left_motor.borrow().enabled);
        assert!(!rig.right_motor.borrow().enabled);
        assert_eq!(rig.left_motor.borrow().enables, 0);
    }

    #[test]
    fn test_behavior_runs_every_second_tick() {
        let mut rig = rig();
        rig.runtime.tick(at(0)).unwrap(); // Init -> Idle
        rig.runtime.tick(at(1)).unwrap();

        // pressed between behavior steps; odd ticks do not consume it
        rig.button.press();
        rig.runtime.tick(at(2)).unwrap();
        assert_eq!(rig.runtime.state(), BehaviorState::LineFollow);
        assert!(!rig.button.is_pending());

        rig.runtime.tick(at(3)).unwrap();
        rig.button.press();
        rig.runtime.tick(at(4)).unwrap();
        rig.runtime.tick(at(5)).unwrap();
        // LineFollow ignores the button; the latch stays set
        assert!(rig.button.is_pending());
    }

    #[test]
    fn test_button_starts_line_follow_and_drives_forward() {
        let mut rig = rig();
        rig.runtime.tick(at(0)).unwrap();
        rig.runtime.tick(at(1)).unwrap();
        rig.heading.set(45.0);
        rig.button.press();
        rig.runtime.tick(at(2)).unwrap();
        assert_eq!(rig.runtime.behavior().starting_heading(), 45.0);

        // LineFollow produces its first command on the next behavior step
        rig.runtime.tick(at(3)).unwrap();
        rig.runtime.tick(at(4)).unwrap();
        assert_eq!(rig.runtime.left().reference(), -5.0);
        assert_eq!(rig.runtime.right().reference(), -5.0);

        // controllers pick the reference up on the following tick
        rig.runtime.tick(at(5)).unwrap();
        assert!(rig.left_motor.borrow().enabled);
        assert!(rig.right_motor.borrow().enabled);
        assert!(rig.left_motor.borrow().duty < 0.0);
    }

    #[test]
    fn test_shutdown_disables_motors() {
        let mut rig = rig();
        rig.runtime.tick(at(0)).unwrap();
        rig.runtime.tick(at(1)).unwrap();
        rig.button.press();
        for t in 2..8 {
            rig.runtime.tick(at(t)).unwrap();
        }
        assert!(rig.left_motor.borrow().enabled);

        rig.runtime.shutdown().unwrap();
        assert!(!rig.left_motor.borrow().enabled);
        assert!(!rig.right_motor.borrow().enabled);
        assert_eq!(rig.left_motor.borrow().duty, 0.0);
    }

    #[test]
    fn test_drop_stops_motors() {
        let rig = rig();
        let left = rig.left_motor.clone();
        left.borrow_mut().enabled = true;
        drop(rig);
        assert!(!left.borrow().enabled);
    }

    #[tokio::test]
    async fn test_run_fast_until_duration() {
        struct Clock(Duration);
        impl Environment for Clock {
            fn advance(&mut self, dt: Duration) {
                self.0 += dt;
            }
        }

        let mut rig = rig();
        let mut clock = Clock(Duration::ZERO);
        let summary = run(
            &mut rig.runtime,
            &mut clock,
            RunOptions {
                duration: Some(Duration::from_millis(200)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.ticks, 10);
        assert_eq!(clock.0, Duration::from_millis(200));
        assert_eq!(summary.final_state, "Idle");
        assert!(summary.pose.is_none());
    }
}
