//! Lap Path Planner.
//!
//! Converts stored checkpoints into the ordered list of waypoints the vehicle
//! flies for one lap.
//!
//! Checkpoint ids encode the order gates were first flown, which is the
//! intended lap order, so routing walks ids in ascending order rather than
//! searching the proximity graph.  The proximity graph is for spatial
//! queries only.
//!
//! # Corner cutting
//!
//! At every gate where the course bends by more than `corner_threshold`
//! radians, a synthetic waypoint is placed `corner_offset` metres to the side
//! of the gate, perpendicular to the outgoing leg, and flown just before the
//! gate itself.  This rounds the corner into something closer to a racing
//! line.  Synthetic waypoints share the gate's id and are never persisted.
//!
//! # Example
//!
//! ```rust
//! use gatelap_runtime::planner::{PathPlanner, PlanNode};
//! use gatelap_types::{Orientation, Position};
//!
//! let nodes = vec![
//!     PlanNode::new(1, Position::new(0.0, 0.0, 1.0), Orientation::default()),
//!     PlanNode::new(2, Position::new(2.0, 0.0, 1.0), Orientation::default()),
//!     PlanNode::new(3, Position::new(2.0, 2.0, 1.0), Orientation::default()),
//! ];
//!
//! let path = PathPlanner::default().build_path(1, 3, &nodes).unwrap();
//! // Left turn at gate 2: a synthetic waypoint precedes it.
//! assert_eq!(path.ids(), vec![1, 2, 2, 3]);
//! assert!(path.waypoints()[1].is_synthetic);
//! ```

use std::f64::consts::FRAC_PI_2;

use gatelap_memory::{CheckpointGraph, CheckpointId, CheckpointNode};
use gatelap_types::{Orientation, Position, wrap_angle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Reasons no path could be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("No checkpoints to plan over")]
    NoCheckpoints,
    #[error("Unknown checkpoint: {0}")]
    UnknownCheckpoint(CheckpointId),
    #[error("Goal {goal} precedes start {start} in lap order")]
    GoalBeforeStart { start: CheckpointId, goal: CheckpointId },
}

// ────────────────────────────────────────────────────────────────────────────
// Node types
// ────────────────────────────────────────────────────────────────────────────

/// How the course bends between a gate and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    #[default]
    Straight,
    TurnLeft,
    TurnRight,
}

/// Axis-aligned capture box around a waypoint.  A vehicle already inside it
/// counts as having reached the waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PotentialField {
    pub x_range: f64,
    pub y_range: f64,
    pub z_range: f64,
}

impl Default for PotentialField {
    fn default() -> Self {
        Self {
            x_range: 0.3,
            y_range: 0.3,
            z_range: 0.2,
        }
    }
}

impl PotentialField {
    pub fn contains(&self, centre: &Position, point: &Position) -> bool {
        (point.x - centre.x).abs() <= self.x_range
            && (point.y - centre.y).abs() <= self.y_range
            && (point.z - centre.z).abs() <= self.z_range
    }
}

/// A checkpoint as seen by the planner, annotated with its link to the next
/// gate in lap order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: CheckpointId,
    pub position: Position,
    /// Attitude at the most recent passage; only yaw is used.
    pub orientation: Orientation,
    pub potential_field: PotentialField,
    /// Next gate in the route-order chain, if any.
    pub next: Option<CheckpointId>,
    pub transition: TransitionType,
    /// Heading from this gate to the next.
    pub approach_angle: f64,
    /// Heading from the next gate to the one after it.
    pub exit_angle: f64,
    /// `true` for corner-cutting waypoints inserted by the planner.
    pub is_synthetic: bool,
}

impl PlanNode {
    pub fn new(id: CheckpointId, position: Position, orientation: Orientation) -> Self {
        Self {
            id,
            position,
            orientation,
            potential_field: PotentialField::default(),
            next: None,
            transition: TransitionType::Straight,
            approach_angle: 0.0,
            exit_angle: 0.0,
            is_synthetic: false,
        }
    }

    pub fn from_checkpoint(node: &CheckpointNode) -> Self {
        Self::new(node.id, node.position, node.orientation())
    }

    /// Every checkpoint of `graph`, in ascending id order.
    pub fn from_graph(graph: &CheckpointGraph) -> Vec<Self> {
        graph.checkpoints().map(Self::from_checkpoint).collect()
    }

    /// Planar heading from this node to `next`.
    pub fn approach_angle_to(&self, next: &PlanNode) -> f64 {
        self.position.heading_to(&next.position)
    }

    /// Whether `point` lies inside this node's capture box.
    pub fn in_potential_field(&self, point: &Position) -> bool {
        self.potential_field.contains(&self.position, point)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FlightPath
// ────────────────────────────────────────────────────────────────────────────

/// Ordered waypoints for one traversal, real and synthetic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlightPath {
    waypoints: Vec<PlanNode>,
}

impl FlightPath {
    pub fn waypoints(&self) -> &[PlanNode] {
        &self.waypoints
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanNode> {
        self.waypoints.iter()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint ids in flight order; synthetic waypoints repeat their gate's id.
    pub fn ids(&self) -> Vec<CheckpointId> {
        self.waypoints.iter().map(|w| w.id).collect()
    }

    pub fn synthetic_count(&self) -> usize {
        self.waypoints.iter().filter(|w| w.is_synthetic).count()
    }
}

impl<'a> IntoIterator for &'a FlightPath {
    type Item = &'a PlanNode;
    type IntoIter = std::slice::Iter<'a, PlanNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.waypoints.iter()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Height helpers
// ────────────────────────────────────────────────────────────────────────────

/// Mean gate altitude, used as the cruise height for a lap.
pub fn average_height(nodes: &[PlanNode]) -> Option<f64> {
    if nodes.is_empty() {
        return None;
    }
    Some(nodes.iter().map(|n| n.position.z).sum::<f64>() / nodes.len() as f64)
}

/// Median gate altitude.
pub fn median_height(nodes: &[PlanNode]) -> Option<f64> {
    if nodes.is_empty() {
        return None;
    }
    let mut heights: Vec<f64> = nodes.iter().map(|n| n.position.z).collect();
    heights.sort_by(f64::total_cmp);
    let n = heights.len();
    Some(if n % 2 == 0 {
        (heights[n / 2 - 1] + heights[n / 2]) / 2.0
    } else {
        heights[n / 2]
    })
}

// ────────────────────────────────────────────────────────────────────────────
// PathPlanner
// ────────────────────────────────────────────────────────────────────────────

/// Angular thresholds and corner offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// Yaw change (radians) below which a transition is `Straight`.
    pub straight_threshold: f64,
    /// Course bend (radians) above which a corner waypoint is inserted.
    pub corner_threshold: f64,
    /// Perpendicular displacement (metres) of a corner waypoint.
    pub corner_offset: f64,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            straight_threshold: 0.1,
            corner_threshold: 0.1,
            corner_offset: 0.2,
        }
    }
}

/// Builds lap paths over checkpoints in id order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPlanner {
    options: PlannerOptions,
}

impl PathPlanner {
    pub fn new(options: PlannerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> PlannerOptions {
        self.options
    }

    /// Classify the yaw change from `current` to `next`.
    pub fn transition_type(&self, current: &PlanNode, next: &PlanNode) -> TransitionType {
        let delta = wrap_angle(next.orientation.yaw - current.orientation.yaw);
        if delta.abs() < self.options.straight_threshold {
            TransitionType::Straight
        } else if delta > 0.0 {
            TransitionType::TurnLeft
        } else {
            TransitionType::TurnRight
        }
    }

    /// Sort `nodes` by id and link each to its successor, filling in the
    /// transition class and approach/exit headings.  The final node keeps no
    /// successor and default annotations.
    pub fn build_sequential_connections(&self, nodes: &mut [PlanNode]) {
        nodes.sort_by_key(|n| n.id);
        for node in nodes.iter_mut() {
            node.next = None;
            node.transition = TransitionType::Straight;
            node.approach_angle = 0.0;
            node.exit_angle = 0.0;
        }
        for i in 0..nodes.len().saturating_sub(1) {
            let next = &nodes[i + 1];
            let transition = self.transition_type(&nodes[i], next);
            let approach = nodes[i].approach_angle_to(next);
            let exit = nodes
                .get(i + 2)
                .map(|after| next.approach_angle_to(after))
                .unwrap_or(approach);
            let next_id = next.id;

            let current = &mut nodes[i];
            current.next = Some(next_id);
            current.transition = transition;
            current.approach_angle = approach;
            current.exit_angle = exit;
            debug!(from = current.id, to = next_id, ?transition, "route link");
        }
    }

    /// Corner-cutting waypoint for `next`, or `None` when the course does not
    /// bend enough there (or there is no look-ahead).
    pub fn compute_intermediate_waypoint(
        &self,
        current: &PlanNode,
        next: &PlanNode,
        next_next: Option<&PlanNode>,
    ) -> Option<PlanNode> {
        let after = next_next?;
        let outgoing = next.position.heading_to(&after.position);
        let incoming = current.position.heading_to(&next.position);
        let bend = wrap_angle(outgoing - incoming);
        if bend.abs() <= self.options.corner_threshold {
            return None;
        }

        let direction = if bend > 0.0 {
            outgoing + FRAC_PI_2
        } else {
            outgoing - FRAC_PI_2
        };
        let mut waypoint = next.clone();
        waypoint.position.x += self.options.corner_offset * direction.cos();
        waypoint.position.y += self.options.corner_offset * direction.sin();
        waypoint.is_synthetic = true;
        Some(waypoint)
    }

    /// Path from `start` to `goal` inclusive, walking ids in ascending order.
    pub fn build_path(
        &self,
        start: CheckpointId,
        goal: CheckpointId,
        nodes: &[PlanNode],
    ) -> Result<FlightPath, PlanError> {
        if nodes.is_empty() {
            return Err(PlanError::NoCheckpoints);
        }
        let mut sorted = nodes.to_vec();
        self.build_sequential_connections(&mut sorted);

        let index_of = |id| {
            sorted
                .iter()
                .position(|n| n.id == id)
                .ok_or(PlanError::UnknownCheckpoint(id))
        };
        let start_idx = index_of(start)?;
        let goal_idx = index_of(goal)?;
        if goal_idx < start_idx {
            return Err(PlanError::GoalBeforeStart { start, goal });
        }

        let mut waypoints = Vec::with_capacity(2 * (goal_idx - start_idx) + 1);
        for i in start_idx..=goal_idx {
            let current = &sorted[i];
            waypoints.push(current.clone());
            if i < goal_idx {
                let next = &sorted[i + 1];
                let next_next = if i + 2 <= goal_idx { sorted.get(i + 2) } else { None };
                if let Some(corner) = self.compute_intermediate_waypoint(current, next, next_next) {
                    debug!(
                        id = corner.id,
                        x = corner.position.x,
                        y = corner.position.y,
                        "corner waypoint inserted"
                    );
                    waypoints.push(corner);
                }
            }
        }
        Ok(FlightPath { waypoints })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
