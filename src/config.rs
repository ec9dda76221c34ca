// Periods, gains and maneuver geometry
//
// The `pub const` values are the tuned defaults for the robot. `NavConfig` mirrors
// them so a JSON file can override any subset (missing fields keep the default).
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

// Scheduler periods (ms)
pub const ENCODER_PERIOD_MS: u64 = 20;
pub const CONTROLLER_PERIOD_MS: u64 = 20;
pub const BEHAVIOR_PERIOD_MS: u64 = 40; // supervisory loop runs slower than the wheel loops

// Wheel speed PI gains
pub const SPEED_KP: f64 = 7.0;
pub const SPEED_KI: f64 = 7.0;

// Encoder: 1440 ticks per wheel revolution
pub const TICKS_PER_REV: f64 = 1440.0;
pub const RAD_PER_TICK: f64 = std::f64::consts::TAU / TICKS_PER_REV;

// Line following
pub const LINE_GAIN: f64 = -15.0;
pub const LINE_NOMINAL_SPEED: f64 = 5.0; // rad/s
pub const LINE_SETTLE_PERIODS: u32 = 22;

// Heading regulator
pub const HEADING_GAIN: f64 = 1.0 / 15.0;
pub const HEADING_TOLERANCE_DEG: f64 = 0.35;

// Line sensor decay cap (us)
pub const LINE_MAX_DECAY_US: u16 = 2000;

/// Cooperative scheduler periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub encoder_period_ms: u64,
    pub controller_period_ms: u64,
    pub behavior_period_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            encoder_period_ms: ENCODER_PERIOD_MS,
            controller_period_ms: CONTROLLER_PERIOD_MS,
            behavior_period_ms: BEHAVIOR_PERIOD_MS,
        }
    }
}

impl Timing {
    pub fn controller_period(&self) -> Duration {
        Duration::from_millis(self.controller_period_ms)
    }

    pub fn encoder_period(&self) -> Duration {
        Duration::from_millis(self.encoder_period_ms)
    }

    /// Number of controller ticks between two behavior steps
    pub fn behavior_divider(&self) -> u64 {
        self.behavior_period_ms / self.controller_period_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedGains {
    pub kp: f64,
    pub ki: f64,
}

impl Default for SpeedGains {
    fn default() -> Self {
        Self {
            kp: SPEED_KP,
            ki: SPEED_KI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFollowTuning {
    /// Multiplies the line position to get the wheel correction
    pub gain: f64,
    /// Forward wheel speed in rad/s
    pub nominal_speed: f64,
    /// Behavior periods after leaving Idle during which the line is ignored
    pub settle_periods: u32,
}

impl Default for LineFollowTuning {
    fn default() -> Self {
        Self {
            gain: LINE_GAIN,
            nominal_speed: LINE_NOMINAL_SPEED,
            settle_periods: LINE_SETTLE_PERIODS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingTuning {
    pub default_gain: f64,
    pub tolerance_deg: f64,
}

impl Default for HeadingTuning {
    fn default() -> Self {
        Self {
            default_gain: HEADING_GAIN,
            tolerance_deg: HEADING_TOLERANCE_DEG,
        }
    }
}

/// Fixed escape geometry used to drive around an obstacle on the line.
///
/// Turn angles are accumulated heading change in degrees (clockwise positive),
/// distances are forward encoder ticks on the left wheel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidManeuver {
    pub turn_away_deg: f64,
    pub side_step_ticks: i32,
    pub turn_parallel_deg: f64,
    pub pass_ticks: i32,
    pub turn_back_deg: f64,
    pub rejoin_turn_deg: f64,
    /// Wheel speed for in-place turns (rad/s)
    pub turn_speed: f64,
    /// Heading-held speed for the straight legs (rad/s)
    pub straight_speed: f64,
}

impl Default for AvoidManeuver {
    fn default() -> Self {
        Self {
            turn_away_deg: 78.0,
            side_step_ticks: 1663, // ~10 in
            turn_parallel_deg: -80.0,
            pass_ticks: 2660, // ~16 in
            turn_back_deg: -80.0,
            rejoin_turn_deg: 60.0,
            turn_speed: 10.0,
            straight_speed: 10.0,
        }
    }
}

/// One speed/gain segment of the final approach, active until `until_fraction`
/// of the approach distance has been covered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproachProfile {
    pub until_fraction: f64,
    pub speed: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnHomeManeuver {
    pub turn_around_ticks: i32,
    pub turn_around_speed: f64,
    pub realign_gain: f64,
    pub approach_ticks: i32,
    pub approach_profiles: Vec<ApproachProfile>,
}

impl Default for ReturnHomeManeuver {
    fn default() -> Self {
        Self {
            turn_around_ticks: 700,
            turn_around_speed: 10.0,
            realign_gain: 1.0 / 12.0,
            approach_ticks: 7100,
            approach_profiles: vec![
                ApproachProfile {
                    until_fraction: 0.9,
                    speed: 20.0,
                    gain: 0.61,
                },
                ApproachProfile {
                    until_fraction: 0.96,
                    speed: 7.5,
                    gain: 1.0 / 3.0,
                },
                ApproachProfile {
                    until_fraction: 1.0,
                    speed: 2.5,
                    gain: 1.0 / 3.0,
                },
            ],
        }
    }
}

/// Behavior state machine tuning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub line_follow: LineFollowTuning,
    pub heading: HeadingTuning,
    pub avoid: AvoidManeuver,
    pub return_home: ReturnHomeManeuver,
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub timing: Timing,
    pub speed: SpeedGains,
    pub behavior: BehaviorConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl NavConfig {
    /// Load a JSON config file, falling back to defaults for missing fields
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: NavConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if t.encoder_period_ms == 0 || t.controller_period_ms == 0 || t.behavior_period_ms == 0 {
            return Err(ConfigError::Invalid("periods must be positive".into()));
        }
        // measured speed is derived from one encoder delta per controller step
        if t.encoder_period_ms != t.controller_period_ms {
            return Err(ConfigError::Invalid(format!(
                "encoder period ({} ms) must equal controller period ({} ms)",
                t.encoder_period_ms, t.controller_period_ms
            )));
        }
        if t.behavior_period_ms % t.controller_period_ms != 0 {
            return Err(ConfigError::Invalid(format!(
                "behavior period ({} ms) must be a multiple of the controller period ({} ms)",
                t.behavior_period_ms, t.controller_period_ms
            )));
        }

        let avoid = &self.behavior.avoid;
        let home = &self.behavior.return_home;
        if avoid.side_step_ticks <= 0
            || avoid.pass_ticks <= 0
            || home.turn_around_ticks <= 0
            || home.approach_ticks <= 0
        {
            return Err(ConfigError::Invalid("leg distances must be positive".into()));
        }
        if home.approach_profiles.is_empty() {
            return Err(ConfigError::Invalid("approach needs at least one profile".into()));
        }
        if self.behavior.heading.tolerance_deg <= 0.0 {
            return Err(ConfigError::Invalid("heading tolerance must be positive".into()));
        }
        Ok(())
    }
}
