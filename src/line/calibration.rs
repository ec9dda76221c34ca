// Per-channel line sensor calibration.
//
// Each channel maps its raw decay time (µs) onto four levels through three
// breakpoints measured on this unit. The table is asymmetric on purpose: every
// channel has its own response, so the values are data and not a formula.

/// Discrete levels a channel reading is mapped onto
pub const LEVELS: [f64; 4] = [0.0, 0.5, 0.75, 1.0];

/// Three ascending breakpoints in µs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelThresholds {
    pub breakpoints: [u16; 3],
}

impl ChannelThresholds {
    pub const fn new(low: u16, mid: u16, high: u16) -> Self {
        Self {
            breakpoints: [low, mid, high],
        }
    }

    /// Level for a raw reading: below the first breakpoint is 0, at or above the last is 1
    pub fn level(&self, raw: u16) -> f64 {
        let idx = self.breakpoints.iter().take_while(|&&b| raw >= b).count();
        LEVELS[idx]
    }
}

/// Calibration for channels 0..7, left to right
pub const CALIBRATION: [ChannelThresholds; 8] = [
    ChannelThresholds::new(600, 1200, 1800),
    ChannelThresholds::new(700, 1200, 1900),
    ChannelThresholds::new(600, 1100, 1700),
    ChannelThresholds::new(600, 1100, 1700),
    ChannelThresholds::new(700, 1200, 1600),
    ChannelThresholds::new(600, 1000, 1600),
    ChannelThresholds::new(600, 1100, 1900),
    ChannelThresholds::new(800, 1300, 1950),
];

/// Threshold a raw reading from `channel` using the built-in table.
/// Channels outside the array read as level 0.
pub fn threshold_linear(raw: u16, channel: usize) -> f64 {
    CALIBRATION.get(channel).map_or(0.0, |t| t.level(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoints_ascending() {
        for (ch, t) in CALIBRATION.iter().enumerate() {
            let [a, b, c] = t.breakpoints;
            assert!(a < b && b < c, "channel {} breakpoints not ascending", ch);
        }
    }

    #[test]
    fn test_channel0_levels() {
        assert_eq!(threshold_linear(0, 0), 0.0);
        assert_eq!(threshold_linear(599, 0), 0.0);
        assert_eq!(threshold_linear(600, 0), 0.5);
        assert_eq!(threshold_linear(1199, 0), 0.5);
        assert_eq!(threshold_linear(1200, 0), 0.75);
        assert_eq!(threshold_linear(1800, 0), 1.0);
        assert_eq!(threshold_linear(2000, 0), 1.0);
    }

    #[test]
    fn test_channels_differ() {
        // 650 us is active on channel 0 but not on channel 1 or 7
        assert_eq!(threshold_linear(650, 0), 0.5);
        assert_eq!(threshold_linear(650, 1), 0.0);
        assert_eq!(threshold_linear(650, 7), 0.0);
        // 1650 us is saturated on channel 4 only among 3 and 4
        assert_eq!(threshold_linear(1650, 3), 0.75);
        assert_eq!(threshold_linear(1650, 4), 1.0);
        // channel 7 needs 1950 to saturate
        assert_eq!(threshold_linear(1949, 7), 0.75);
        assert_eq!(threshold_linear(1950, 7), 1.0);
    }

    #[test]
    fn test_unknown_channel_reads_zero() {
        assert_eq!(threshold_linear(2000, 8), 0.0);
        assert_eq!(threshold_linear(2000, usize::MAX), 0.0);
    }
}
