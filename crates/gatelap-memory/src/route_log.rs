//! Lap Route Log.
//!
//! While a lap is flown, [`RouteRecorder`] keeps a thinned copy of the
//! trajectory.  A tick becomes a [`RoutePoint`] when at least
//! `min_record_interval` seconds passed since the last kept point, when the
//! vehicle moved at least `significant_change` metres, or when the tick marks
//! arrival at a checkpoint.  Consecutive points form [`RouteSegment`]s with
//! their own duration, length and average speed.
//!
//! Stopping the recorder writes `route_data_lap_<n>.json` into the route
//! directory:
//!
//! | field              | description                                   |
//! |--------------------|-----------------------------------------------|
//! | `lap_number`       | 1-based lap index                             |
//! | `start_time`       | wall-clock lap start (ISO-8601, UTC)          |
//! | `checkpoint_times` | checkpoint id → seconds since lap start       |
//! | `points`           | every kept [`RoutePoint`]                     |
//! | `segments`         | every [`RouteSegment`]                        |

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gatelap_types::{BilateralRanges, Orientation, PoseSample, Position, Velocity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::checkpoint_graph::CheckpointId;
use crate::persist::{PersistError, write_json_atomic};

/// Minimum spacing in time (seconds) between kept samples.
pub const DEFAULT_MIN_RECORD_INTERVAL: f64 = 0.1;
/// Displacement (metres) that forces a sample to be kept regardless of time.
pub const DEFAULT_SIGNIFICANT_CHANGE: f64 = 0.05;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while writing or reading lap files.
#[derive(Error, Debug)]
pub enum RouteLogError {
    #[error("Failed to write lap file: {0}")]
    Persist(#[from] PersistError),
    #[error("Failed to read lap file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed lap file: {0}")]
    Parse(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// One kept trajectory sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Seconds since the lap started.
    pub timestamp: f64,
    pub position: Position,
    pub orientation: Orientation,
    pub velocity: Velocity,
    pub lidar_readings: BilateralRanges,
    pub checkpoint_id: Option<CheckpointId>,
    pub is_checkpoint: bool,
}

/// The stretch between two consecutive [`RoutePoint`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub distance: f64,
    pub avg_speed: f64,
}

impl RouteSegment {
    fn between(start: &RoutePoint, end: &RoutePoint) -> Self {
        let duration = end.timestamp - start.timestamp;
        let distance = start.position.distance(&end.position);
        Self {
            start_time: start.timestamp,
            end_time: end.timestamp,
            duration,
            distance,
            avg_speed: if duration > 0.0 { distance / duration } else { 0.0 },
        }
    }
}

/// Summary of one lap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapStatistics {
    pub lap_number: u32,
    pub total_distance: f64,
    pub total_duration: f64,
    pub average_speed: f64,
    pub checkpoint_times: BTreeMap<CheckpointId, f64>,
    pub number_of_points: usize,
    pub number_of_segments: usize,
}

/// On-disk form of one lap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lap_number: u32,
    pub start_time: DateTime<Utc>,
    pub checkpoint_times: BTreeMap<CheckpointId, f64>,
    pub points: Vec<RoutePoint>,
    pub segments: Vec<RouteSegment>,
}

impl LapRecord {
    pub fn load(path: &Path) -> Result<Self, RouteLogError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RouteRecorder
// ─────────────────────────────────────────────────────────────────────────────

/// Thinned trajectory recorder, one lap at a time.
#[derive(Debug)]
pub struct RouteRecorder {
    dir: PathBuf,
    min_record_interval: f64,
    significant_change: f64,
    recording: bool,
    lap_number: u32,
    started_at: DateTime<Utc>,
    lap_start_time: Option<f64>,
    last_record_time: Option<f64>,
    last_position: Option<Position>,
    checkpoint_times: BTreeMap<CheckpointId, f64>,
    points: Vec<RoutePoint>,
    segments: Vec<RouteSegment>,
}

impl RouteRecorder {
    /// Create a recorder writing lap files into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            min_record_interval: DEFAULT_MIN_RECORD_INTERVAL,
            significant_change: DEFAULT_SIGNIFICANT_CHANGE,
            recording: false,
            lap_number: 0,
            started_at: Utc::now(),
            lap_start_time: None,
            last_record_time: None,
            last_position: None,
            checkpoint_times: BTreeMap::new(),
            points: Vec::new(),
            segments: Vec::new(),
        }
    }

    /// Override the thinning thresholds.
    pub fn with_thresholds(mut self, min_record_interval: f64, significant_change: f64) -> Self {
        self.min_record_interval = min_record_interval;
        self.significant_change = significant_change;
        self
    }

    /// Path of the file written for `lap_number`.
    pub fn lap_path(&self, lap_number: u32) -> PathBuf {
        self.dir.join(format!("route_data_lap_{lap_number}.json"))
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn lap_number(&self) -> u32 {
        self.lap_number
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    /// Discard any previous lap and start recording `lap_number`.
    pub fn start(&mut self, lap_number: u32) {
        self.recording = true;
        self.lap_number = lap_number;
        self.started_at = Utc::now();
        self.lap_start_time = None;
        self.last_record_time = None;
        self.last_position = None;
        self.checkpoint_times.clear();
        self.points.clear();
        self.segments.clear();
        info!(lap = lap_number, "lap recording started");
    }

    /// Offer one tick.  Returns the kept point, or `None` when the tick was
    /// thinned out or the recorder is idle.
    pub fn record(
        &mut self,
        sample: &PoseSample,
        ranges: BilateralRanges,
        checkpoint: Option<CheckpointId>,
    ) -> Option<&RoutePoint> {
        if !self.recording {
            return None;
        }
        let lap_start = *self.lap_start_time.get_or_insert(sample.time_s);
        let elapsed = sample.time_s - lap_start;
        if let Some(id) = checkpoint {
            self.checkpoint_times.insert(id, elapsed);
        }

        let interval_due = self
            .last_record_time
            .is_none_or(|t| sample.time_s - t >= self.min_record_interval);
        let moved = self
            .last_position
            .is_some_and(|p| p.distance(&sample.position) >= self.significant_change);
        if !(interval_due || moved || checkpoint.is_some()) {
            return None;
        }

        let point = RoutePoint {
            timestamp: elapsed,
            position: sample.position,
            orientation: sample.orientation,
            velocity: sample.velocity,
            lidar_readings: ranges,
            checkpoint_id: checkpoint,
            is_checkpoint: checkpoint.is_some(),
        };
        if let Some(prev) = self.points.last() {
            self.segments.push(RouteSegment::between(prev, &point));
        }
        self.last_record_time = Some(sample.time_s);
        self.last_position = Some(sample.position);
        self.points.push(point);
        self.points.last()
    }

    /// Stop recording and write the lap file.
    ///
    /// Returns the written path, or `None` when nothing was recording or no
    /// point was kept.
    pub fn stop(&mut self) -> Result<Option<PathBuf>, RouteLogError> {
        if !self.recording {
            return Ok(None);
        }
        self.recording = false;
        if self.points.is_empty() {
            return Ok(None);
        }
        let record = LapRecord {
            lap_number: self.lap_number,
            start_time: self.started_at,
            checkpoint_times: self.checkpoint_times.clone(),
            points: self.points.clone(),
            segments: self.segments.clone(),
        };
        let path = self.lap_path(self.lap_number);
        write_json_atomic(&path, &record)?;
        info!(lap = self.lap_number, path = %path.display(), points = self.points.len(), "lap route saved");
        Ok(Some(path))
    }

    /// Totals for the current (or last stopped) lap.
    pub fn statistics(&self) -> LapStatistics {
        let total_distance: f64 = self.segments.iter().map(|s| s.distance).sum();
        let total_duration = self.points.last().map(|p| p.timestamp).unwrap_or(0.0);
        LapStatistics {
            lap_number: self.lap_number,
            total_distance,
            total_duration,
            average_speed: if total_duration > 0.0 {
                total_distance / total_duration
            } else {
                0.0
            },
            checkpoint_times: self.checkpoint_times.clone(),
            number_of_points: self.points.len(),
            number_of_segments: self.segments.len(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
