// Wrap-corrected tick counting on top of a 16-bit hardware counter

use crate::hal::TickCounter;

/// Cumulative position tracker for one wheel encoder.
///
/// [`update`](Self::update) must run at a fixed period. Between two updates the
/// wheel must turn less than half the counter range (32767 ticks); at 1440
/// ticks/rev and a 20 ms period that is ~22 rev per period, far above what the
/// drive can do. Calling it less often than that breaks direction recovery.
pub struct OdometryChannel {
    counter: Box<dyn TickCounter>,
    position: i32,
    last_raw: u16,
    current_raw: u16,
    delta: i16,
}

impl OdometryChannel {
    pub fn new(counter: Box<dyn TickCounter>) -> Self {
        Self {
            counter,
            position: 0,
            last_raw: 0,
            current_raw: 0,
            delta: 0,
        }
    }

    /// Sample the counter and accumulate the short-way delta
    pub fn update(&mut self) {
        self.last_raw = self.current_raw;
        self.current_raw = self.counter.count();
        self.delta = short_way_delta(self.last_raw, self.current_raw);
        self.position = self.position.wrapping_add(self.delta as i32);
    }

    /// Cumulative ticks since the last zero
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Ticks moved during the last update period
    pub fn delta(&self) -> i16 {
        self.delta
    }

    /// Reset the software baseline. The hardware counter keeps running, so the
    /// first update afterwards sees the raw count relative to zero.
    pub fn zero(&mut self) {
        self.position = 0;
        self.last_raw = 0;
        self.current_raw = 0;
        self.delta = 0;
    }
}

/// Signed difference between two raw counts, taking the shorter direction.
///
/// A jump of exactly half the range is ambiguous; it always resolves to -32768.
pub fn short_way_delta(last: u16, current: u16) -> i16 {
    current.wrapping_sub(last) as i16
}
