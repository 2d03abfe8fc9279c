//! `gatelap-memory` – The Course Record.
//!
//! Durable state for the gate-lap stack, stored as pretty-printed JSON
//! documents rewritten atomically after every change.
//!
//! # Modules
//!
//! - [`checkpoint_graph`] – [`CheckpointGraph`][checkpoint_graph::CheckpointGraph]:
//!   the persistent set of detected gates.  Assigns stable, never-reused ids,
//!   keeps a per-gate passage history and links gates closer than the edge
//!   radius into a symmetric proximity graph.
//! - [`route_log`] – [`RouteRecorder`][route_log::RouteRecorder]: samples the
//!   flown trajectory of a lap, derives segment speeds and lap statistics and
//!   writes one `route_data_lap_<n>.json` file per lap.
//! - [`persist`] – [`write_json_atomic`][persist::write_json_atomic]: the
//!   write-to-temp-then-rename helper both stores share.

pub mod checkpoint_graph;
pub mod persist;
pub mod route_log;

pub use checkpoint_graph::{
    CheckpointDocument, CheckpointGraph, CheckpointId, CheckpointNode, CheckpointPatch,
    DocumentError, DocumentMetadata, Edge, GraphError, GraphOptions, PassageRecord,
};
pub use persist::{PersistError, write_json_atomic};
pub use route_log::{LapRecord, LapStatistics, RouteLogError, RoutePoint, RouteRecorder, RouteSegment};
