//! `gatelap-types` – shared vocabulary for the gate-lap stack.
//!
//! Plain data carried between the perception filter, the checkpoint store and
//! the planner: world-frame positions, attitude, velocity, bilateral ranging
//! readings and the [`PassageEvent`] produced each time the vehicle threads a
//! gate.  Field names and nesting match the persisted checkpoint document.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Wrap an angle (radians) into `[-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A point in the shared world frame (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in 3-D.
    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }

    /// Distance in the horizontal (x, y) plane, ignoring altitude.
    pub fn planar_distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Planar heading from `self` towards `other`, `atan2(Δy, Δx)`.
    pub fn heading_to(&self, other: &Position) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

/// Vehicle attitude in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Orientation {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    /// Tilt magnitude used to rank passage samples: `|roll| + |pitch|`.
    /// Lower is steadier.
    pub fn instability(&self) -> f64 {
        self.roll.abs() + self.pitch.abs()
    }
}

/// Linear velocity in the world frame (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64, vz: f64) -> Self {
        Self { vx, vy, vz }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensing
// ────────────────────────────────────────────────────────────────────────────

/// Which gate post the vehicle passed closest to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// One reading of the left/right ranging pair, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BilateralRanges {
    pub left: f64,
    pub right: f64,
}

impl BilateralRanges {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// `|left − right|`; zero means the vehicle crossed dead centre.
    pub fn imbalance(&self) -> f64 {
        (self.left - self.right).abs()
    }

    /// The post the vehicle is nearer to.  Ties resolve to [`Side::Right`].
    pub fn nearer_side(&self) -> Side {
        if self.left < self.right {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// Pose and velocity reported by the external state estimator for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseSample {
    /// Simulation / vehicle clock, seconds.
    pub time_s: f64,
    pub position: Position,
    pub orientation: Orientation,
    pub velocity: Velocity,
}

/// A single gate-passage trigger, produced once per ranging trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageEvent {
    pub position: Position,
    pub orientation: Orientation,
    pub velocity: Velocity,
    pub side: Side,
    pub ranges: BilateralRanges,
    pub timestamp: DateTime<Utc>,
}

impl PassageEvent {
    /// Build an event from a pose sample and the ranging pair that fired.
    pub fn from_sample(sample: &PoseSample, ranges: BilateralRanges, timestamp: DateTime<Utc>) -> Self {
        Self {
            position: sample.position,
            orientation: sample.orientation,
            velocity: sample.velocity,
            side: ranges.nearer_side(),
            ranges,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_angle_stays_in_range() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(0.25) - 0.25).abs() < 1e-12);
        assert!((wrap_angle(TAU + 0.1) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn distances_and_heading() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 12.0);
        assert!((a.distance(&b) - 13.0).abs() < 1e-12);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-12);
        let c = Position::new(0.0, 1.0, 0.0);
        assert!((a.heading_to(&c) - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn nearer_side_prefers_left_only_when_strictly_closer() {
        assert_eq!(BilateralRanges::new(0.2, 0.4).nearer_side(), Side::Left);
        assert_eq!(BilateralRanges::new(0.4, 0.2).nearer_side(), Side::Right);
        assert_eq!(BilateralRanges::new(0.3, 0.3).nearer_side(), Side::Right);
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Left).unwrap(), "\"left\"");
        let back: Side = serde_json::from_str("\"right\"").unwrap();
        assert_eq!(back, Side::Right);
    }

    #[test]
    fn passage_event_from_sample_picks_side() {
        let sample = PoseSample {
            time_s: 1.0,
            position: Position::new(1.0, 2.0, 3.0),
            orientation: Orientation::new(0.1, -0.2, 1.0),
            velocity: Velocity::new(0.5, 0.0, 0.0),
        };
        let event = PassageEvent::from_sample(&sample, BilateralRanges::new(0.1, 0.9), Utc::now());
        assert_eq!(event.side, Side::Left);
        assert_eq!(event.position, sample.position);
        assert!((event.orientation.instability() - 0.3).abs() < 1e-12);
        assert!((event.ranges.imbalance() - 0.8).abs() < 1e-12);
    }
}
