// Test course: a straight tape line ending in a perpendicular finish bar,
// optionally with a box sitting on the line.

use crate::config::LINE_MAX_DECAY_US;

/// Decay time over bare floor (us)
const FLOOR_DECAY_US: u16 = 300;
/// Decay time with the tape edge partly under the sensor (us)
const EDGE_DECAY_US: u16 = 1300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center_x: f64,
    pub center_y: f64,
    pub half_size: f64,
}

impl Obstacle {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (x - self.center_x).abs() <= self.half_size && (y - self.center_y).abs() <= self.half_size
    }
}

/// Course geometry in meters. The line runs along y = 0 toward +x.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub line_start_x: f64,
    /// x of the finish bar's near edge
    pub finish_x: f64,
    pub line_half_width: f64,
    pub finish_bar_depth: f64,
    pub finish_bar_half_length: f64,
    pub obstacle: Option<Obstacle>,
}

impl Course {
    /// Line with a finish bar and no obstacle
    pub fn straight(length: f64) -> Self {
        Self {
            line_start_x: -0.3,
            finish_x: length,
            line_half_width: 0.009,
            finish_bar_depth: 0.025,
            finish_bar_half_length: 0.12,
            obstacle: None,
        }
    }

    /// Line with a 12 cm box centered on it at `obstacle_x`
    pub fn with_obstacle(length: f64, obstacle_x: f64) -> Self {
        Self {
            obstacle: Some(Obstacle {
                center_x: obstacle_x,
                center_y: 0.0,
                half_size: 0.06,
            }),
            ..Self::straight(length)
        }
    }

    fn on_line(&self, x: f64, y: f64, half_width: f64) -> bool {
        x >= self.line_start_x && x <= self.finish_x && y.abs() <= half_width
    }

    fn on_finish_bar(&self, x: f64, y: f64) -> bool {
        x >= self.finish_x
            && x <= self.finish_x + self.finish_bar_depth
            && y.abs() <= self.finish_bar_half_length
    }

    /// Decay time a reflectance sensor over (x, y) would report
    pub fn decay_at(&self, x: f64, y: f64) -> u16 {
        if self.on_finish_bar(x, y) || self.on_line(x, y, self.line_half_width) {
            LINE_MAX_DECAY_US
        } else if self.on_line(x, y, self.line_half_width * 1.5) {
            EDGE_DECAY_US
        } else {
            FLOOR_DECAY_US
        }
    }

    pub fn is_blocked(&self, x: f64, y: f64) -> bool {
        self.obstacle.is_some_and(|o| o.contains(x, y))
    }
}
