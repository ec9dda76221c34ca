// Reflectance line sensing
//
// - calibration: per-channel breakpoint table
// - estimator: thresholding + centroid over the 8-channel array

pub mod calibration;
pub mod estimator;

pub use calibration::{CALIBRATION, ChannelThresholds, threshold_linear};
pub use estimator::{LinePosition, LinePositionEstimator, NUM_CHANNELS};
