//! Lap execution over the stored checkpoints.
//!
//! [`CourseRunner`] plans one lap from the first checkpoint to the last and
//! flies it up to `max_laps` times through a [`Navigator`], recording a thinned
//! route log per lap.
//!
//! Each lap:
//!
//! 1. Waypoints whose potential field already contains the vehicle are
//!    skipped (typically the real gate right after its corner waypoint).
//! 2. Every other waypoint is flown at the cruise height, the mean altitude
//!    of all checkpoints.
//! 3. After each arrival the vehicle dwells for `stabilization_time` before
//!    the next leg.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use gatelap_memory::{CheckpointGraph, GraphOptions};
//! use gatelap_runtime::course::{CourseConfig, CourseRunner};
//! use gatelap_runtime::planner::PathPlanner;
//! use gatelap_runtime::sim::SimNavigator;
//! use gatelap_types::{BilateralRanges, PassageEvent, PoseSample, Position};
//!
//! let mut graph = CheckpointGraph::in_memory(GraphOptions::default());
//! for x in [0.0, 3.0, 6.0] {
//!     let sample = PoseSample { position: Position::new(x, 0.0, 1.0), ..Default::default() };
//!     let event = PassageEvent::from_sample(&sample, BilateralRanges::new(0.3, 0.4), Utc::now());
//!     graph.add_checkpoint(sample.position, &event).unwrap();
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = CourseConfig { max_laps: 1, ..CourseConfig::default() };
//! let mut runner = CourseRunner::new(PathPlanner::default(), config, dir.path());
//! let mut nav = SimNavigator::new(Position::new(-2.0, 0.0, 0.0));
//!
//! let report = runner.run(&graph, &mut nav).unwrap();
//! assert_eq!(report.laps.len(), 1);
//! assert_eq!(nav.targets().len(), 3);
//! ```

use std::path::{Path, PathBuf};

use gatelap_memory::{CheckpointGraph, CheckpointId, LapStatistics, RouteLogError, RouteRecorder};
use gatelap_types::{BilateralRanges, PoseSample, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::planner::{FlightPath, PathPlanner, PlanError, PlanNode, average_height};
use crate::telemetry::lap_span;

// ────────────────────────────────────────────────────────────────────────────
// Navigator seam
// ────────────────────────────────────────────────────────────────────────────

/// Failure reported by the navigation executor.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct NavigationError(pub String);

impl NavigationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The vehicle as seen by the lap runner: a pose source, the ranging pair
/// and blocking motion primitives.
///
/// Stabilisation and actuation live behind this trait.
pub trait Navigator {
    /// Current pose, velocity and clock.
    fn sample(&mut self) -> PoseSample;

    /// Latest bilateral ranging pair.
    fn ranges(&mut self) -> BilateralRanges;

    /// Climb or descend to `altitude` and hold there.
    fn hover(&mut self, altitude: f64) -> Result<(), NavigationError>;

    /// Fly to `target` and return once it is reached.
    fn goto(&mut self, target: Position) -> Result<(), NavigationError>;

    /// Hold position for `seconds`.
    fn wait(&mut self, seconds: f64);
}

// ────────────────────────────────────────────────────────────────────────────
// Config / report / errors
// ────────────────────────────────────────────────────────────────────────────

fn default_max_laps() -> u32 {
    3
}

fn default_stabilization_time() -> f64 {
    0.2
}

fn default_lap_pause() -> f64 {
    1.0
}

/// Lap execution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    #[serde(default = "default_max_laps")]
    pub max_laps: u32,
    /// Dwell after each waypoint, seconds.
    #[serde(default = "default_stabilization_time")]
    pub stabilization_time: f64,
    /// Pause between laps, seconds.
    #[serde(default = "default_lap_pause")]
    pub lap_pause: f64,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            max_laps: default_max_laps(),
            stabilization_time: default_stabilization_time(),
            lap_pause: default_lap_pause(),
        }
    }
}

/// Outcome of a completed course.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourseReport {
    /// Wall time of each lap on the vehicle clock, seconds.
    pub lap_times: Vec<f64>,
    pub laps: Vec<LapStatistics>,
    /// Route log written for each lap, when any point was kept.
    pub route_files: Vec<PathBuf>,
}

impl CourseReport {
    pub fn best_lap_time(&self) -> Option<f64> {
        self.lap_times.iter().copied().min_by(f64::total_cmp)
    }
}

#[derive(Error, Debug)]
pub enum CourseError {
    #[error("No checkpoints recorded")]
    NoCheckpoints,
    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error("Could not reach cruise height: {0}")]
    Hover(#[source] NavigationError),
    #[error("Waypoint for checkpoint {id} unreachable: {source}")]
    Unreachable {
        id: CheckpointId,
        #[source]
        source: NavigationError,
    },
    #[error("Route log error: {0}")]
    RouteLog(#[from] RouteLogError),
}

// ────────────────────────────────────────────────────────────────────────────
// CourseRunner
// ────────────────────────────────────────────────────────────────────────────

/// Flies planned laps and keeps the route log.
#[derive(Debug)]
pub struct CourseRunner {
    planner: PathPlanner,
    config: CourseConfig,
    recorder: RouteRecorder,
}

impl CourseRunner {
    /// `route_dir` receives one `route_data_lap_<n>.json` per lap.
    pub fn new(planner: PathPlanner, config: CourseConfig, route_dir: impl AsRef<Path>) -> Self {
        Self {
            planner,
            config,
            recorder: RouteRecorder::new(route_dir.as_ref()),
        }
    }

    /// Replace the route recorder, e.g. to change thinning thresholds.
    pub fn with_recorder(mut self, recorder: RouteRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> CourseConfig {
        self.config
    }

    pub fn recorder(&self) -> &RouteRecorder {
        &self.recorder
    }

    /// Fly the course over every checkpoint in `graph`.
    pub fn run(
        &mut self,
        graph: &CheckpointGraph,
        nav: &mut dyn Navigator,
    ) -> Result<CourseReport, CourseError> {
        let nodes = PlanNode::from_graph(graph);
        let (Some(first), Some(last), Some(cruise)) =
            (nodes.first(), nodes.last(), average_height(&nodes))
        else {
            return Err(CourseError::NoCheckpoints);
        };
        let path = self.planner.build_path(first.id, last.id, &nodes)?;
        info!(
            checkpoints = nodes.len(),
            waypoints = path.len(),
            cruise_height = cruise,
            max_laps = self.config.max_laps,
            "course started"
        );

        nav.hover(cruise).map_err(CourseError::Hover)?;

        let mut report = CourseReport::default();
        for lap in 1..=self.config.max_laps {
            let span = lap_span(lap, nodes.len(), path.len());
            let _enter = span.enter();

            let lap_start = nav.sample().time_s;
            self.recorder.start(lap);
            if let Err(e) = self.fly_lap(&path, cruise, nav) {
                if let Err(log_err) = self.recorder.stop() {
                    warn!(error = %log_err, "partial lap route not saved");
                }
                return Err(e);
            }
            let lap_time = nav.sample().time_s - lap_start;

            if let Some(file) = self.recorder.stop()? {
                report.route_files.push(file);
            }
            report.lap_times.push(lap_time);
            report.laps.push(self.recorder.statistics());
            info!(lap, lap_time, "lap completed");

            if lap < self.config.max_laps {
                nav.wait(self.config.lap_pause);
            }
        }
        info!(laps = report.lap_times.len(), best = ?report.best_lap_time(), "course finished");
        Ok(report)
    }

    fn fly_lap(
        &mut self,
        path: &FlightPath,
        cruise: f64,
        nav: &mut dyn Navigator,
    ) -> Result<(), CourseError> {
        for waypoint in path {
            let marker = (!waypoint.is_synthetic).then_some(waypoint.id);
            let here = nav.sample();
            if waypoint.in_potential_field(&here.position) {
                debug!(id = waypoint.id, synthetic = waypoint.is_synthetic, "waypoint already reached");
                let ranges = nav.ranges();
                self.recorder.record(&here, ranges, marker);
                continue;
            }

            let target = Position::new(waypoint.position.x, waypoint.position.y, cruise);
            nav.goto(target).map_err(|source| {
                warn!(id = waypoint.id, error = %source, "waypoint unreachable");
                CourseError::Unreachable {
                    id: waypoint.id,
                    source,
                }
            })?;
            nav.wait(self.config.stabilization_time);

            let arrived = nav.sample();
            let ranges = nav.ranges();
            self.recorder.record(&arrived, ranges, marker);
            debug!(id = waypoint.id, synthetic = waypoint.is_synthetic, "waypoint reached");
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimNavigator;
    use chrono::Utc;
    use gatelap_memory::{GraphOptions, LapRecord};
    use gatelap_types::PassageEvent;

    fn graph_with(points: &[(f64, f64, f64)]) -> CheckpointGraph {
        let mut graph = CheckpointGraph::in_memory(GraphOptions::default());
        for &(x, y, z) in points {
            let sample = PoseSample {
                position: Position::new(x, y, z),
                ..Default::default()
            };
            let event = PassageEvent::from_sample(&sample, BilateralRanges::new(0.3, 0.4), Utc::now());
            graph.add_checkpoint(sample.position, &event).unwrap();
        }
        graph
    }

    fn runner(dir: &Path, max_laps: u32) -> CourseRunner {
        let config = CourseConfig {
            max_laps,
            ..CourseConfig::default()
        };
        CourseRunner::new(PathPlanner::default(), config, dir)
    }

    fn close(a: Position, b: Position) -> bool {
        a.distance(&b) < 1e-9
    }

    #[test]
    fn empty_graph_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let graph = CheckpointGraph::in_memory(GraphOptions::default());
        let mut nav = SimNavigator::new(Position::default());
        let err = runner(dir.path(), 1).run(&graph, &mut nav).unwrap_err();
        assert!(matches!(err, CourseError::NoCheckpoints));
        assert!(nav.targets().is_empty());
    }

    #[test]
    fn corner_gate_is_skipped_after_its_corner_waypoint() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph_with(&[(0.0, 0.0, 1.0), (2.0, 0.0, 1.0), (2.0, 2.0, 1.0)]);
        let mut nav = SimNavigator::new(Position::new(-5.0, 0.0, 0.0));

        let report = runner(dir.path(), 3).run(&graph, &mut nav).unwrap();

        assert_eq!(nav.hover_altitudes(), &[1.0]);
        let expected = [
            Position::new(0.0, 0.0, 1.0),
            Position::new(1.8, 0.0, 1.0),
            Position::new(2.0, 2.0, 1.0),
        ];
        assert_eq!(nav.targets().len(), 9);
        for (lap, chunk) in nav.targets().chunks(3).enumerate() {
            for (got, want) in chunk.iter().zip(expected.iter()) {
                assert!(close(*got, *want), "lap {}: {got:?} != {want:?}", lap + 1);
            }
        }

        assert_eq!(report.lap_times.len(), 3);
        assert!(report.lap_times.iter().all(|t| *t > 0.0));
        assert_eq!(report.laps.len(), 3);
        assert_eq!(report.route_files.len(), 3);
        for lap in 1..=3 {
            assert!(dir.path().join(format!("route_data_lap_{lap}.json")).exists());
        }
    }

    #[test]
    fn lap_log_marks_real_checkpoints_only() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph_with(&[(0.0, 0.0, 1.0), (2.0, 0.0, 1.0), (2.0, 2.0, 1.0)]);
        let mut nav = SimNavigator::new(Position::new(-5.0, 0.0, 0.0));

        let report = runner(dir.path(), 1).run(&graph, &mut nav).unwrap();
        let record = LapRecord::load(&report.route_files[0]).unwrap();

        let marked: Vec<_> = record.points.iter().filter_map(|p| p.checkpoint_id).collect();
        assert_eq!(marked, vec![1, 2, 3]);
        assert_eq!(record.points.len(), 4);
        assert_eq!(report.laps[0].checkpoint_times.len(), 3);
    }

    #[test]
    fn cruise_height_is_mean_checkpoint_altitude() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph_with(&[(0.0, 0.0, 1.0), (3.0, 0.0, 2.0), (6.0, 0.0, 3.0)]);
        let mut nav = SimNavigator::new(Position::new(-5.0, 0.0, 0.0));

        runner(dir.path(), 1).run(&graph, &mut nav).unwrap();
        assert_eq!(nav.hover_altitudes(), &[2.0]);
        assert!(nav.targets().iter().all(|t| t.z == 2.0));
    }

    #[test]
    fn unreachable_waypoint_aborts_course() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph_with(&[(0.0, 0.0, 1.0), (3.0, 0.0, 1.0), (6.0, 0.0, 1.0)]);
        let mut nav = SimNavigator::new(Position::new(-5.0, 0.0, 0.0))
            .with_unreachable(Position::new(3.0, 0.0, 1.0));

        let err = runner(dir.path(), 3).run(&graph, &mut nav).unwrap_err();
        match err {
            CourseError::Unreachable { id, .. } => assert_eq!(id, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!nav.targets().iter().any(|t| t.x == 6.0));
        // The partial first lap is still written.
        assert!(dir.path().join("route_data_lap_1.json").exists());
    }

    #[test]
    fn hover_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph_with(&[(0.0, 0.0, 1.0)]);
        let mut nav = SimNavigator::new(Position::default()).with_hover_failure();
        let err = runner(dir.path(), 1).run(&graph, &mut nav).unwrap_err();
        assert!(matches!(err, CourseError::Hover(_)));
    }

    #[test]
    fn pauses_between_laps_only() {
        let dir = tempfile::tempdir().unwrap();
        let graph = graph_with(&[(0.0, 0.0, 1.0), (3.0, 0.0, 1.0)]);
        let mut nav = SimNavigator::new(Position::new(-5.0, 0.0, 1.0));

        runner(dir.path(), 2).run(&graph, &mut nav).unwrap();
        let pauses = nav.waits().iter().filter(|w| **w == 1.0).count();
        assert_eq!(pauses, 1);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: CourseConfig = serde_json::from_str(r#"{"max_laps": 5}"#).unwrap();
        assert_eq!(cfg.max_laps, 5);
        assert_eq!(cfg.stabilization_time, 0.2);
        assert_eq!(cfg.lap_pause, 1.0);
    }
}
