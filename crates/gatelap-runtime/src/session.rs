//! Recording session: detector, filter, checkpoint graph and planner owned
//! together for the life of one control loop.
//!
//! While recording is on, every control tick is offered to
//! [`Session::record_tick`]:
//!
//! ```text
//! PoseSample + BilateralRanges
//!     → PassageDetector   (trigger below lidar_threshold)
//!     → PassageFilter     (one canonical point per gate)
//!     → CheckpointGraph   (dedupe, id, edges, atomic write)
//! ```
//!
//! A superseding emission for a gate that already produced a checkpoint
//! moves that checkpoint and replaces its latest passage record; it never
//! creates a second gate.
//!
//! # Example
//!
//! ```rust
//! use gatelap_runtime::session::{RecordOutcome, Session, SessionConfig};
//! use gatelap_types::{BilateralRanges, PoseSample, Position};
//!
//! let mut session = Session::in_memory(SessionConfig::default());
//! session.set_recording(true);
//!
//! let tick = PoseSample { position: Position::new(0.0, 0.0, 1.0), ..Default::default() };
//! let outcome = session.record_tick(&tick, BilateralRanges::new(0.3, 0.4)).unwrap();
//! assert_eq!(outcome, Some(RecordOutcome::Added { id: 1, region_id: 0 }));
//! ```

use std::path::PathBuf;

use chrono::Utc;
use gatelap_memory::checkpoint_graph::{DEFAULT_DEDUPE_RADIUS, DEFAULT_EDGE_RADIUS};
use gatelap_memory::{
    CheckpointGraph, CheckpointId, CheckpointPatch, GraphError, GraphOptions, PassageRecord,
};
use gatelap_perception::{
    DEFAULT_LIDAR_THRESHOLD, DEFAULT_MIN_DISTANCE, PassageDetector, PassageFilter,
};
use gatelap_types::{BilateralRanges, PassageEvent, PoseSample};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::course::{CourseConfig, CourseError, CourseReport, CourseRunner, Navigator};
use crate::planner::{FlightPath, PathPlanner, PlanError, PlanNode, PlannerOptions};

// ────────────────────────────────────────────────────────────────────────────
// Config
// ────────────────────────────────────────────────────────────────────────────

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("checkpoints.json")
}

fn default_route_dir() -> PathBuf {
    PathBuf::from("routes")
}

fn default_lidar_threshold() -> f64 {
    DEFAULT_LIDAR_THRESHOLD
}

fn default_min_region_distance() -> f64 {
    DEFAULT_MIN_DISTANCE
}

fn default_dedupe_radius() -> f64 {
    DEFAULT_DEDUPE_RADIUS
}

fn default_edge_radius() -> f64 {
    DEFAULT_EDGE_RADIUS
}

/// Everything a session needs, with every field defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Persisted checkpoint document.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,
    /// Directory for per-lap route logs.
    #[serde(default = "default_route_dir")]
    pub route_dir: PathBuf,
    /// Ranging trigger distance, metres.
    #[serde(default = "default_lidar_threshold")]
    pub lidar_threshold: f64,
    /// Planar radius grouping triggers into one gate, metres.
    #[serde(default = "default_min_region_distance")]
    pub min_region_distance: f64,
    #[serde(default = "default_dedupe_radius")]
    pub dedupe_radius: f64,
    #[serde(default = "default_edge_radius")]
    pub edge_radius: f64,
    #[serde(default)]
    pub planner: PlannerOptions,
    #[serde(default)]
    pub course: CourseConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_file: default_checkpoint_file(),
            route_dir: default_route_dir(),
            lidar_threshold: default_lidar_threshold(),
            min_region_distance: default_min_region_distance(),
            dedupe_radius: default_dedupe_radius(),
            edge_radius: default_edge_radius(),
            planner: PlannerOptions::default(),
            course: CourseConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions {
            dedupe_radius: self.dedupe_radius,
            edge_radius: self.edge_radius,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

/// What a recorded tick did to the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordOutcome {
    /// A new gate was stored.
    Added { id: CheckpointId, region_id: u32 },
    /// A better sample replaced the stored one for the same gate.
    Superseded { id: CheckpointId, region_id: u32 },
    /// The canonical point fell inside the dedupe radius of the last gate.
    Suppressed { region_id: u32, distance: f64 },
}

/// Owns the recording pipeline and the planner for one control loop.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    detector: PassageDetector,
    filter: PassageFilter,
    graph: CheckpointGraph,
    planner: PathPlanner,
    recording: bool,
    /// Filter region that produced the most recently stored gate.
    region_checkpoint: Option<(u32, CheckpointId)>,
}

impl Session {
    /// Open a session backed by `config.checkpoint_file`.  A missing or
    /// malformed document starts an empty graph.
    pub fn open(config: SessionConfig) -> Self {
        let graph = CheckpointGraph::open(&config.checkpoint_file, config.graph_options());
        info!(
            path = %config.checkpoint_file.display(),
            checkpoints = graph.len(),
            "session opened"
        );
        Self::with_graph(config, graph)
    }

    /// A session whose graph is never written to disk.
    pub fn in_memory(config: SessionConfig) -> Self {
        let graph = CheckpointGraph::in_memory(config.graph_options());
        Self::with_graph(config, graph)
    }

    fn with_graph(config: SessionConfig, graph: CheckpointGraph) -> Self {
        Self {
            detector: PassageDetector::new(config.lidar_threshold),
            filter: PassageFilter::with_min_distance(config.min_region_distance),
            planner: PathPlanner::new(config.planner),
            graph,
            recording: false,
            region_checkpoint: None,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn graph(&self) -> &CheckpointGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut CheckpointGraph {
        &mut self.graph
    }

    pub fn filter(&self) -> &PassageFilter {
        &self.filter
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        if self.recording != recording {
            info!(recording, "checkpoint recording toggled");
        }
        self.recording = recording;
    }

    /// Offer one control tick to the recording pipeline.
    ///
    /// Returns `Ok(None)` when recording is off, nothing triggered, or the
    /// filter absorbed the trigger.
    pub fn record_tick(
        &mut self,
        sample: &PoseSample,
        ranges: BilateralRanges,
    ) -> Result<Option<RecordOutcome>, GraphError> {
        if !self.recording {
            return Ok(None);
        }
        let Some(event) = self.detector.detect(sample, ranges, Utc::now()) else {
            return Ok(None);
        };
        let Some(point) = self.filter.add_event(event) else {
            return Ok(None);
        };

        let region_id = point.region_id;
        if point.supersedes
            && let Some((region, id)) = self.region_checkpoint
            && region == region_id
        {
            self.supersede(id, &point.event)?;
            return Ok(Some(RecordOutcome::Superseded { id, region_id }));
        }

        match self.graph.add_checkpoint(point.event.position, &point.event) {
            Ok(id) => {
                self.region_checkpoint = Some((region_id, id));
                Ok(Some(RecordOutcome::Added { id, region_id }))
            }
            Err(GraphError::TooClose { distance, .. }) => {
                Ok(Some(RecordOutcome::Suppressed { region_id, distance }))
            }
            Err(e @ GraphError::Persist { .. }) => {
                // Stored in memory even though the write failed.
                self.region_checkpoint = Some((region_id, self.graph.last_checkpoint_id()));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn supersede(&mut self, id: CheckpointId, event: &PassageEvent) -> Result<(), GraphError> {
        let node = self.graph.get_checkpoint(id).ok_or(GraphError::NotFound(id))?;
        let mut history = node.passage_history.clone();
        history.pop();
        history.push(PassageRecord::from(event));
        debug!(id, x = event.position.x, y = event.position.y, "checkpoint superseded");
        self.graph.update_checkpoint(
            id,
            CheckpointPatch {
                position: Some(event.position),
                passage_history: Some(history),
                ..CheckpointPatch::default()
            },
        )
    }

    /// Forget every stored gate and start a fresh filter.  Ids keep counting
    /// from where they were.
    pub fn reset(&mut self) -> Result<(), GraphError> {
        self.filter = PassageFilter::with_min_distance(self.config.min_region_distance);
        self.region_checkpoint = None;
        let cleared = self.graph.clear();
        if let Err(e) = &cleared {
            warn!(error = %e, "reset could not rewrite the checkpoint document");
        }
        info!(next_id = self.graph.last_checkpoint_id() + 1, "session reset");
        cleared
    }

    /// Lap path from the first stored checkpoint to the last.
    pub fn plan_lap(&self) -> Result<FlightPath, PlanError> {
        let nodes = PlanNode::from_graph(&self.graph);
        let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
            return Err(PlanError::NoCheckpoints);
        };
        self.planner.build_path(first.id, last.id, &nodes)
    }

    /// Fly the configured number of laps over the stored checkpoints.
    pub fn run_course(&mut self, nav: &mut dyn Navigator) -> Result<CourseReport, CourseError> {
        if self.recording {
            self.set_recording(false);
        }
        let mut runner = CourseRunner::new(self.planner, self.config.course, &self.config.route_dir);
        runner.run(&self.graph, nav)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
