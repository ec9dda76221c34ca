// Line position from the 8-channel reflectance array.
//
// Each raw reading is thresholded through its channel's calibration, then the
// centroid of the levels gives a signed offset in [-1, 1]. Channel 0 is the
// leftmost sensor, so negative means the line is left of center.

use tracing::trace;

use super::calibration::{CALIBRATION, ChannelThresholds};
use crate::hal::LineChannel;

pub const NUM_CHANNELS: usize = 8;

/// Fraction of full scale above which the array is considered saturated
const ALL_ON_FRACTION: f64 = 0.85;

/// Centroid normalizer, (N - 1) / 2
const HALF_SPAN: f64 = (NUM_CHANNELS as f64 - 1.0) / 2.0;

/// Line offset reported by the estimator.
///
/// Regular values lie in [-1, 1]. Exactly 0 means no line (or a perfectly
/// centered one), and 2 is the cross-line sentinel: nearly every channel sees
/// the line, as happens on a perpendicular finish bar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinePosition(f64);

impl LinePosition {
    pub const NONE: LinePosition = LinePosition(0.0);
    pub const CROSS_LINE: LinePosition = LinePosition(2.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_cross_line(self) -> bool {
        self.0 == Self::CROSS_LINE.0
    }

    /// Anything other than exactly zero
    pub fn is_detected(self) -> bool {
        self.0 != 0.0
    }
}

/// Compute the line position from one set of raw readings
pub fn estimate(raw: &[u16; NUM_CHANNELS], table: &[ChannelThresholds; NUM_CHANNELS]) -> LinePosition {
    let levels: [f64; NUM_CHANNELS] = std::array::from_fn(|i| table[i].level(raw[i]));
    let total: f64 = levels.iter().sum();

    if total >= NUM_CHANNELS as f64 * ALL_ON_FRACTION {
        return LinePosition::CROSS_LINE;
    }
    if total <= 0.0 {
        return LinePosition::NONE;
    }

    let weighted: f64 = levels
        .iter()
        .enumerate()
        .map(|(i, &v)| v * (i as f64 - HALF_SPAN))
        .sum();
    LinePosition(weighted / (total * HALF_SPAN))
}

/// Owns the eight channels and the calibration table
pub struct LinePositionEstimator {
    channels: [Box<dyn LineChannel>; NUM_CHANNELS],
    table: [ChannelThresholds; NUM_CHANNELS],
    last_raw: [u16; NUM_CHANNELS],
    position: LinePosition,
}

impl LinePositionEstimator {
    /// Build from exactly eight channels, ordered left to right
    pub fn new(channels: [Box<dyn LineChannel>; NUM_CHANNELS]) -> Self {
        Self::with_table(channels, CALIBRATION)
    }

    pub fn with_table(
        channels: [Box<dyn LineChannel>; NUM_CHANNELS],
        table: [ChannelThresholds; NUM_CHANNELS],
    ) -> Self {
        Self {
            channels,
            table,
            last_raw: [0; NUM_CHANNELS],
            position: LinePosition::NONE,
        }
    }

    /// Sample every channel and recompute the position
    pub fn update(&mut self) -> LinePosition {
        for (slot, channel) in self.last_raw.iter_mut().zip(self.channels.iter_mut()) {
            *slot = channel.sample();
        }
        self.position = estimate(&self.last_raw, &self.table);
        trace!("Line raw {:?} -> {:.3}", self.last_raw, self.position.value());
        self.position
    }

    /// Position from the most recent update
    pub fn position(&self) -> LinePosition {
        self.position
    }

    pub fn last_raw(&self) -> &[u16; NUM_CHANNELS] {
        &self.last_raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est(raw: [u16; NUM_CHANNELS]) -> LinePosition {
        estimate(&raw, &CALIBRATION)
    }

    #[test]
    fn test_all_zero_is_no_line() {
        assert_eq!(est([0; 8]), LinePosition::NONE);
        assert!(!est([0; 8]).is_detected());
    }

    #[test]
    fn test_all_max_is_cross_line() {
        assert!(est([2000; 8]).is_cross_line());
    }

    #[test]
    fn test_saturation_threshold() {
        // 6 channels at 1 and 2 at 0.5: sum 7 >= 6.8
        let pos = est([2000, 2000, 2000, 2000, 2000, 2000, 650, 850]);
        assert!(pos.is_cross_line());
        // 6 at 1, 1 at 0.75 and one off: sum 6.75 < 6.8
        let pos = est([2000, 2000, 2000, 2000, 2000, 2000, 1200, 0]);
        assert!(!pos.is_cross_line());
        assert!(pos.value() < 0.0);
    }

    #[test]
    fn test_single_channel_sign_by_side() {
        for ch in 0..NUM_CHANNELS {
            let mut raw = [0u16; 8];
            raw[ch] = CALIBRATION[ch].breakpoints[2];
            let pos = est(raw).value();
            if ch < 4 {
                assert!(pos < 0.0, "channel {} should read left, got {}", ch, pos);
            } else {
                assert!(pos > 0.0, "channel {} should read right, got {}", ch, pos);
            }
        }
    }

    #[test]
    fn test_extremes_are_unit() {
        let mut raw = [0u16; 8];
        raw[0] = 2000;
        assert_eq!(est(raw).value(), -1.0);
        let mut raw = [0u16; 8];
        raw[7] = 2000;
        assert_eq!(est(raw).value(), 1.0);
    }

    #[test]
    fn test_centered_pair_reads_zero() {
        // symmetric about the middle reads as exactly zero, same as no line
        let pos = est([0, 0, 0, 2000, 2000, 0, 0, 0]);
        assert_eq!(pos.value(), 0.0);
    }

    #[test]
    fn test_weighted_centroid() {
        // ch2 at 0.5, ch3 at 1.0: weighted = 0.5*-1.5 + 1.0*-0.5 = -1.25, sum 1.5
        let pos = est([0, 0, 700, 1800, 0, 0, 0, 0]).value();
        let expected = -1.25 / (1.5 * 3.5);
        assert!((pos - expected).abs() < 1e-12);
    }

    struct Fixed(u16);

    impl LineChannel for Fixed {
        fn sample(&mut self) -> u16 {
            self.0
        }
    }

    #[test]
    fn test_estimator_samples_channels() {
        let mut estimator = LinePositionEstimator::new([
            Box::new(Fixed(0)),
            Box::new(Fixed(0)),
            Box::new(Fixed(0)),
            Box::new(Fixed(0)),
            Box::new(Fixed(0)),
            Box::new(Fixed(0)),
            Box::new(Fixed(1900)),
            Box::new(Fixed(2000)),
        ]);
        let pos = estimator.update();
        assert!(pos.value() > 0.5);
        assert_eq!(estimator.position(), pos);
        assert_eq!(estimator.last_raw()[7], 2000);
    }
}
