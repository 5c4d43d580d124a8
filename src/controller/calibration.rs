//! Axis sample conditioning: dead band, centering and range scaling

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Measured travel of a physical axis
///
/// `min` and `max` are the raw extremes the axis actually reaches, `center`
/// is its raw rest position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub min: f32,
    pub max: f32,
    pub center: f32,
}

impl Calibration {
    pub fn is_valid(&self) -> bool {
        self.min < 0.0 && self.max > 0.0
    }
}

/// Drops samples that moved less than the dead band since the last accepted one
#[derive(Debug, Clone)]
pub struct AxisFilter {
    dead_band: f32,
    last_positions: HashMap<u32, f32>,
}

impl AxisFilter {
    pub fn new(dead_band: f32) -> Self {
        Self {
            dead_band,
            last_positions: HashMap::new(),
        }
    }

    /// Returns `true` and remembers the sample when it is far enough from the last one
    pub fn accept(&mut self, code: u32, position: f32) -> bool {
        if let Some(last) = self.last_positions.get(&code) {
            if (last - position).abs() < self.dead_band {
                return false;
            }
        }

        self.last_positions.insert(code, position);
        true
    }
}

/// Maps a raw sample onto [-1, 1]
///
/// Samples within twice the dead band of the center snap to exactly 0.
/// Uncalibrated axes are only snapped and clamped.
pub fn normalize(position: f32, calibration: Option<&Calibration>, dead_band: f32) -> f32 {
    let position = match calibration {
        Some(calibration) => position - calibration.center,
        None => position,
    };

    if position.abs() < dead_band * 2.0 {
        return 0.0;
    }

    let scale = match calibration {
        Some(calibration) if position > 0.0 => 1.0 / calibration.max,
        Some(calibration) => (1.0 / calibration.min).abs(),
        None => 1.0,
    };

    (position * scale).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLL: Calibration = Calibration {
        min: -0.6,
        max: 0.6,
        center: 0.01,
    };

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn small_moves_are_filtered_per_axis() {
        let mut filter = AxisFilter::new(0.02);

        assert!(filter.accept(0, 0.5));
        assert!(!filter.accept(0, 0.51));
        assert!(filter.accept(1, 0.51));
        assert!(filter.accept(0, 0.53));
    }

    #[test]
    fn near_center_snaps_to_zero() {
        assert_eq!(normalize(0.04, Some(&ROLL), 0.02), 0.0);
        assert_eq!(normalize(-0.02, Some(&ROLL), 0.02), 0.0);
        assert_eq!(normalize(0.03, None, 0.02), 0.0);
    }

    #[test]
    fn calibrated_travel_reaches_full_scale() {
        assert!(close(normalize(0.31, Some(&ROLL), 0.02), 0.5));
        assert!(close(normalize(-0.29, Some(&ROLL), 0.02), -0.5));
    }

    #[test]
    fn output_is_clamped() {
        assert_eq!(normalize(0.9, Some(&ROLL), 0.02), 1.0);
        assert_eq!(normalize(-0.9, Some(&ROLL), 0.02), -1.0);
        assert_eq!(normalize(1.4, None, 0.02), 1.0);
    }

    #[test]
    fn calibration_needs_both_directions() {
        assert!(ROLL.is_valid());
        assert!(!Calibration {
            min: 0.1,
            max: 0.6,
            center: 0.0
        }
        .is_valid());
    }
}
