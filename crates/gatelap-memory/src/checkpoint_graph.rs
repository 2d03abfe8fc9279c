//! Checkpoint Graph.
//!
//! The durable record of every gate detected while recording a course.  Each
//! gate becomes a [`CheckpointNode`] with a stable integer id, a world-frame
//! position, the history of passages through it and a list of [`Edge`]s to
//! neighbouring gates.
//!
//! # Identity
//!
//! Ids start at 1 and increase by one per accepted insertion.  They are never
//! reused: the counter survives deletes and is persisted in the document
//! metadata.  Because gates are recorded in flight order, the id doubles as
//! the intended lap order.
//!
//! # Proximity edges
//!
//! When a node is inserted it is linked to every existing node within
//! `edge_radius` (3 m by default) by a mirrored pair of edges carrying the
//! Euclidean distance.  Edges are created once and never recomputed; moving a
//! node later does not add or drop links.
//!
//! # Storage layout
//!
//! One pretty-printed JSON document per graph:
//!
//! ```text
//! {
//!   "checkpoints": { "<id>": { "id", "position", "connections", "passage_history" } },
//!   "metadata":    { "last_checkpoint_id", "last_update" }
//! }
//! ```
//!
//! The document is rewritten atomically after every mutation.  A document that
//! fails to parse or validate is logged and replaced by an empty graph.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use gatelap_memory::checkpoint_graph::{CheckpointGraph, GraphOptions};
//! use gatelap_types::{BilateralRanges, Orientation, PassageEvent, Position, Side, Velocity};
//!
//! let passage = PassageEvent {
//!     position: Position::default(),
//!     orientation: Orientation::default(),
//!     velocity: Velocity::default(),
//!     side: Side::Left,
//!     ranges: BilateralRanges::new(0.2, 0.3),
//!     timestamp: Utc::now(),
//! };
//!
//! let mut graph = CheckpointGraph::in_memory(GraphOptions::default());
//! let a = graph.add_checkpoint(Position::new(0.0, 0.0, 1.0), &passage).unwrap();
//! let b = graph.add_checkpoint(Position::new(2.0, 0.0, 1.0), &passage).unwrap();
//!
//! assert_eq!((a, b), (1, 2));
//! assert_eq!(graph.get_checkpoint(a).unwrap().connections[0].to_checkpoint_id, b);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use gatelap_types::{BilateralRanges, Orientation, PassageEvent, Position, Side, Velocity};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persist::{PersistError, write_json_atomic};

/// Stable checkpoint identifier.
pub type CheckpointId = u32;

/// Candidates closer than this (metres, 3-D) to the last confirmed checkpoint
/// are treated as a repeat of it.
pub const DEFAULT_DEDUPE_RADIUS: f64 = 1.0;
/// Checkpoints within this distance (metres, 3-D) of each other are linked.
pub const DEFAULT_EDGE_RADIUS: f64 = 3.0;

// ─────────────────────────────────────────────────────────────────────────────
// Error types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors returned by graph operations.
///
/// A [`GraphError::Persist`] means the in-memory mutation **did** happen; only
/// the write to disk failed.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Checkpoint not found: {0}")]
    NotFound(CheckpointId),
    #[error("Candidate is {distance:.3} m from checkpoint {last}, inside the dedupe radius")]
    TooClose { last: CheckpointId, distance: f64 },
    #[error("Failed to persist checkpoint document to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
}

/// Reasons a persisted document is rejected at load time.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Entry keyed {key} carries id {id}")]
    KeyMismatch { key: CheckpointId, id: CheckpointId },
    #[error("Checkpoint {from} has an edge to missing checkpoint {to}")]
    DanglingEdge { from: CheckpointId, to: CheckpointId },
}

// ─────────────────────────────────────────────────────────────────────────────
// Document types
// ─────────────────────────────────────────────────────────────────────────────

/// One side of a proximity link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    pub to_checkpoint_id: CheckpointId,
    pub distance: f64,
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default)]
    pub average_speed: f64,
    #[serde(default)]
    pub best_approach_angle: f64,
}

fn default_difficulty() -> f64 {
    1.0
}

impl Edge {
    /// A fresh edge with default difficulty, speed and approach angle.
    pub fn new(to_checkpoint_id: CheckpointId, distance: f64) -> Self {
        Self {
            to_checkpoint_id,
            distance,
            difficulty: default_difficulty(),
            average_speed: 0.0,
            best_approach_angle: 0.0,
        }
    }
}

/// Parse a document timestamp.
///
/// RFC 3339 strings keep their offset.  ISO-8601 strings without an offset
/// (`2024-05-01T12:00:00.123456`, as written by older recorders) are read
/// as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => raw
            .parse::<NaiveDateTime>()
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// A single recorded pass through a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PassageRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub approach_side: Side,
    pub lidar_readings: BilateralRanges,
    pub orientation: Orientation,
    pub velocity: Velocity,
}

impl From<&PassageEvent> for PassageRecord {
    fn from(event: &PassageEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            approach_side: event.side,
            lidar_readings: event.ranges,
            orientation: event.orientation,
            velocity: event.velocity,
        }
    }
}

/// A stored gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointNode {
    pub id: CheckpointId,
    pub position: Position,
    #[serde(default)]
    pub connections: Vec<Edge>,
    #[serde(default)]
    pub passage_history: Vec<PassageRecord>,
}

impl CheckpointNode {
    /// The most recent passage, if any was recorded.
    pub fn last_passage(&self) -> Option<&PassageRecord> {
        self.passage_history.last()
    }

    /// Attitude at the most recent passage, or level/north when there is none.
    pub fn orientation(&self) -> Orientation {
        self.last_passage().map(|p| p.orientation).unwrap_or_default()
    }

    pub fn edge_to(&self, id: CheckpointId) -> Option<&Edge> {
        self.connections.iter().find(|e| e.to_checkpoint_id == id)
    }
}

/// Shallow update applied by [`CheckpointGraph::update_checkpoint`].
/// `None` fields are left untouched; `Some` fields overwrite wholesale.
#[derive(Debug, Clone, Default)]
pub struct CheckpointPatch {
    pub position: Option<Position>,
    pub connections: Option<Vec<Edge>>,
    pub passage_history: Option<Vec<PassageRecord>>,
}

/// Document-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentMetadata {
    pub last_checkpoint_id: CheckpointId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_update: DateTime<Utc>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            last_checkpoint_id: 0,
            last_update: Utc::now(),
        }
    }
}

/// The on-disk form of a [`CheckpointGraph`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointDocument {
    #[serde(default)]
    pub checkpoints: BTreeMap<CheckpointId, CheckpointNode>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl CheckpointDocument {
    /// JSON Schema of the persisted document, for external readers.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(CheckpointDocument)
    }

    /// Read and validate a document.  Returns `Ok(None)` when `path` does not
    /// exist.
    pub fn load(path: &Path) -> Result<Option<Self>, DocumentError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let doc: CheckpointDocument = serde_json::from_str(&raw)?;
        doc.validate()?;
        Ok(Some(doc))
    }

    /// Check that map keys match node ids and no edge points at a missing node.
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (key, node) in &self.checkpoints {
            if *key != node.id {
                return Err(DocumentError::KeyMismatch { key: *key, id: node.id });
            }
            if let Some(edge) = node
                .connections
                .iter()
                .find(|e| !self.checkpoints.contains_key(&e.to_checkpoint_id))
            {
                return Err(DocumentError::DanglingEdge {
                    from: node.id,
                    to: edge.to_checkpoint_id,
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CheckpointGraph
// ─────────────────────────────────────────────────────────────────────────────

/// Tunable radii for deduplication and edge synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphOptions {
    pub dedupe_radius: f64,
    pub edge_radius: f64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            dedupe_radius: DEFAULT_DEDUPE_RADIUS,
            edge_radius: DEFAULT_EDGE_RADIUS,
        }
    }
}

/// Persistent store of checkpoint nodes.
///
/// Every successful mutating call rewrites the backing document before
/// returning.  An in-memory graph (see [`CheckpointGraph::in_memory`]) skips
/// the write.
#[derive(Debug)]
pub struct CheckpointGraph {
    path: Option<PathBuf>,
    options: GraphOptions,
    checkpoints: BTreeMap<CheckpointId, CheckpointNode>,
    last_checkpoint_id: CheckpointId,
    last_update: DateTime<Utc>,
    /// Checkpoint most recently accepted by this instance; the dedupe anchor.
    last_confirmed: Option<CheckpointId>,
}

impl CheckpointGraph {
    /// Open the graph stored at `path`.
    ///
    /// A missing file yields an empty graph.  A malformed file is logged and
    /// also yields an empty graph; it is overwritten by the next mutation.
    pub fn open(path: impl Into<PathBuf>, options: GraphOptions) -> Self {
        let path = path.into();
        let document = match CheckpointDocument::load(&path) {
            Ok(Some(doc)) => {
                info!(
                    path = %path.display(),
                    checkpoints = doc.checkpoints.len(),
                    "checkpoint document loaded"
                );
                doc
            }
            Ok(None) => {
                debug!(path = %path.display(), "no checkpoint document; starting empty");
                CheckpointDocument::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid checkpoint document; starting empty");
                CheckpointDocument::default()
            }
        };
        Self::from_document(document, Some(path), options)
    }

    /// An unpersisted graph (useful for testing and dry runs).
    pub fn in_memory(options: GraphOptions) -> Self {
        Self::from_document(CheckpointDocument::default(), None, options)
    }

    fn from_document(doc: CheckpointDocument, path: Option<PathBuf>, options: GraphOptions) -> Self {
        let max_key = doc.checkpoints.keys().next_back().copied().unwrap_or(0);
        Self {
            path,
            options,
            last_checkpoint_id: doc.metadata.last_checkpoint_id.max(max_key),
            last_update: doc.metadata.last_update,
            checkpoints: doc.checkpoints,
            last_confirmed: None,
        }
    }

    /// Snapshot the graph as a serialisable document.
    pub fn to_document(&self) -> CheckpointDocument {
        CheckpointDocument {
            checkpoints: self.checkpoints.clone(),
            metadata: DocumentMetadata {
                last_checkpoint_id: self.last_checkpoint_id,
                last_update: self.last_update,
            },
        }
    }

    // ── queries ─────────────────────────────────────────────────────────────

    pub fn get_checkpoint(&self, id: CheckpointId) -> Option<&CheckpointNode> {
        self.checkpoints.get(&id)
    }

    /// All checkpoints in ascending id order.
    pub fn checkpoints(&self) -> impl Iterator<Item = &CheckpointNode> {
        self.checkpoints.values()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Highest id ever assigned (0 before the first insertion).
    pub fn last_checkpoint_id(&self) -> CheckpointId {
        self.last_checkpoint_id
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Position of the last checkpoint accepted by this instance, if it still
    /// exists.
    pub fn last_confirmed_position(&self) -> Option<Position> {
        self.last_confirmed
            .and_then(|id| self.checkpoints.get(&id))
            .map(|node| node.position)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    // ── mutations ───────────────────────────────────────────────────────────

    /// Insert a gate at `position`, recording `passage` as its first pass.
    ///
    /// Rejected with [`GraphError::TooClose`] (nothing stored, nothing written)
    /// when `position` lies inside the dedupe radius of the last confirmed
    /// checkpoint.  Otherwise the node is linked to every existing node within
    /// the edge radius and the document is rewritten.
    pub fn add_checkpoint(
        &mut self,
        position: Position,
        passage: &PassageEvent,
    ) -> Result<CheckpointId, GraphError> {
        if let Some(last) = self.last_confirmed
            && let Some(anchor) = self.checkpoints.get(&last)
        {
            let distance = anchor.position.distance(&position);
            if distance < self.options.dedupe_radius {
                debug!(last, distance, "checkpoint suppressed as duplicate");
                return Err(GraphError::TooClose { last, distance });
            }
        }

        let id = self.last_checkpoint_id + 1;
        let mut node = CheckpointNode {
            id,
            position,
            connections: Vec::new(),
            passage_history: vec![PassageRecord::from(passage)],
        };

        for (other_id, other) in self.checkpoints.iter_mut() {
            let distance = position.distance(&other.position);
            if distance <= self.options.edge_radius {
                node.connections.push(Edge::new(*other_id, distance));
                other.connections.push(Edge::new(id, distance));
            }
        }

        info!(
            id,
            x = position.x,
            y = position.y,
            z = position.z,
            side = %passage.side,
            edges = node.connections.len(),
            "checkpoint added"
        );

        self.checkpoints.insert(id, node);
        self.last_checkpoint_id = id;
        self.last_confirmed = Some(id);
        self.save()?;
        Ok(id)
    }

    /// Append another pass through an existing gate (e.g. on a later lap).
    pub fn record_passage(&mut self, id: CheckpointId, passage: &PassageEvent) -> Result<(), GraphError> {
        let node = self.checkpoints.get_mut(&id).ok_or(GraphError::NotFound(id))?;
        node.passage_history.push(PassageRecord::from(passage));
        debug!(id, passes = node.passage_history.len(), "passage recorded");
        self.save()
    }

    /// Overwrite the fields present in `patch`.  Edges are not recomputed.
    pub fn update_checkpoint(&mut self, id: CheckpointId, patch: CheckpointPatch) -> Result<(), GraphError> {
        let node = self.checkpoints.get_mut(&id).ok_or(GraphError::NotFound(id))?;
        if let Some(position) = patch.position {
            node.position = position;
        }
        if let Some(connections) = patch.connections {
            node.connections = connections;
        }
        if let Some(history) = patch.passage_history {
            node.passage_history = history;
        }
        debug!(id, "checkpoint updated");
        self.save()
    }

    /// Remove a checkpoint and every edge pointing at it.  The id is retired.
    pub fn delete_checkpoint(&mut self, id: CheckpointId) -> Result<(), GraphError> {
        if self.checkpoints.remove(&id).is_none() {
            return Err(GraphError::NotFound(id));
        }
        for node in self.checkpoints.values_mut() {
            node.connections.retain(|e| e.to_checkpoint_id != id);
        }
        if self.last_confirmed == Some(id) {
            self.last_confirmed = None;
        }
        info!(id, remaining = self.checkpoints.len(), "checkpoint deleted");
        self.save()
    }

    /// Drop every checkpoint.  The id counter is kept so ids stay unique.
    pub fn clear(&mut self) -> Result<(), GraphError> {
        self.checkpoints.clear();
        self.last_confirmed = None;
        info!("checkpoint graph cleared");
        self.save()
    }

    /// Rewrite the backing document now.
    pub fn flush(&mut self) -> Result<(), GraphError> {
        self.save()
    }

    fn save(&mut self) -> Result<(), GraphError> {
        self.last_update = Utc::now();
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json_atomic(path, &self.to_document()).map_err(|source| {
            warn!(path = %path.display(), error = %source, "checkpoint document write failed");
            GraphError::Persist {
                path: path.clone(),
                source,
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
