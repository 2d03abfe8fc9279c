//! In-process simulated vehicle for headless runs and tests.
//!
//! [`SimNavigator`] implements [`Navigator`] by teleporting to each target
//! and advancing a simulated clock by the travel time at a fixed cruise
//! speed.  It records every command so tests can assert on the flown route.
//!
//! # Example
//!
//! ```rust
//! use gatelap_runtime::course::Navigator;
//! use gatelap_runtime::sim::SimNavigator;
//! use gatelap_types::Position;
//!
//! let mut nav = SimNavigator::new(Position::new(0.0, 0.0, 0.0));
//! nav.hover(1.0).unwrap();
//! nav.goto(Position::new(2.0, 0.0, 1.0)).unwrap();
//!
//! assert_eq!(nav.sample().position, Position::new(2.0, 0.0, 1.0));
//! assert!(nav.sample().time_s > 0.0);
//! ```

use gatelap_types::{BilateralRanges, Orientation, PoseSample, Position, Velocity};

use crate::course::{NavigationError, Navigator};

/// Simulated cruise speed, metres per second.
pub const SIM_SPEED: f64 = 1.0;

/// A kinematic stand-in for the real vehicle.  Every command succeeds unless
/// a failure was injected.
#[derive(Debug, Clone)]
pub struct SimNavigator {
    time_s: f64,
    position: Position,
    ranges: BilateralRanges,
    targets: Vec<Position>,
    hover_altitudes: Vec<f64>,
    waits: Vec<f64>,
    unreachable: Option<Position>,
    fail_hover: bool,
}

impl SimNavigator {
    pub fn new(position: Position) -> Self {
        Self {
            time_s: 0.0,
            position,
            ranges: BilateralRanges::new(5.0, 5.0),
            targets: Vec::new(),
            hover_altitudes: Vec::new(),
            waits: Vec::new(),
            unreachable: None,
            fail_hover: false,
        }
    }

    /// Make `goto` fail for targets within 1 cm of `target`.
    pub fn with_unreachable(mut self, target: Position) -> Self {
        self.unreachable = Some(target);
        self
    }

    /// Make every `hover` call fail.
    pub fn with_hover_failure(mut self) -> Self {
        self.fail_hover = true;
        self
    }

    /// Fix the ranging pair reported by [`Navigator::ranges`].
    pub fn set_ranges(&mut self, ranges: BilateralRanges) {
        self.ranges = ranges;
    }

    /// Targets reached by `goto`, in order.
    pub fn targets(&self) -> &[Position] {
        &self.targets
    }

    pub fn hover_altitudes(&self) -> &[f64] {
        &self.hover_altitudes
    }

    pub fn waits(&self) -> &[f64] {
        &self.waits
    }

    fn travel_to(&mut self, target: Position) {
        self.time_s += self.position.distance(&target) / SIM_SPEED;
        self.position = target;
    }
}

impl Navigator for SimNavigator {
    fn sample(&mut self) -> PoseSample {
        PoseSample {
            time_s: self.time_s,
            position: self.position,
            orientation: Orientation::default(),
            velocity: Velocity::default(),
        }
    }

    fn ranges(&mut self) -> BilateralRanges {
        self.ranges
    }

    fn hover(&mut self, altitude: f64) -> Result<(), NavigationError> {
        if self.fail_hover {
            return Err(NavigationError::new("simulated hover failure"));
        }
        self.hover_altitudes.push(altitude);
        let target = Position::new(self.position.x, self.position.y, altitude);
        self.travel_to(target);
        Ok(())
    }

    fn goto(&mut self, target: Position) -> Result<(), NavigationError> {
        if self.unreachable.is_some_and(|p| p.distance(&target) < 0.01) {
            return Err(NavigationError::new(format!(
                "simulated obstruction at ({:.2}, {:.2}, {:.2})",
                target.x, target.y, target.z
            )));
        }
        self.targets.push(target);
        self.travel_to(target);
        Ok(())
    }

    fn wait(&mut self, seconds: f64) {
        self.waits.push(seconds);
        self.time_s += seconds.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_with_travel_and_waits() {
        let mut nav = SimNavigator::new(Position::default());
        nav.goto(Position::new(3.0, 4.0, 0.0)).unwrap();
        assert!((nav.sample().time_s - 5.0).abs() < 1e-12);
        nav.wait(0.5);
        assert!((nav.sample().time_s - 5.5).abs() < 1e-12);
        assert_eq!(nav.waits(), &[0.5]);
    }

    #[test]
    fn injected_failure_leaves_vehicle_in_place() {
        let blocked = Position::new(1.0, 0.0, 0.0);
        let mut nav = SimNavigator::new(Position::default()).with_unreachable(blocked);
        assert!(nav.goto(blocked).is_err());
        assert_eq!(nav.sample().position, Position::default());
        assert!(nav.targets().is_empty());
    }

    #[test]
    fn hover_keeps_planar_position() {
        let mut nav = SimNavigator::new(Position::new(1.0, 2.0, 0.0));
        nav.hover(1.5).unwrap();
        assert_eq!(nav.sample().position, Position::new(1.0, 2.0, 1.5));
    }
}
