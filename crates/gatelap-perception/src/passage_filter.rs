//! Passage Debounce Filter.
//!
//! Flying through a gate fires the ranging trigger on every tick the ring is
//! in view, producing a burst of near-identical [`PassageEvent`]s.  The
//! filter groups the burst into a spatial *region* and keeps one "current
//! best" sample per region.
//!
//! # Algorithm
//!
//! - The first event anchors a region at its planar `(x, y)` and is emitted.
//! - An event closer than `min_distance` (planar) to the anchor joins the
//!   region.  It replaces the best, and is emitted again, only when it is
//!   **both** better centred (`|left − right|` strictly smaller) **and**
//!   steadier (`|roll| + |pitch|` strictly smaller).  Otherwise nothing is
//!   emitted.
//! - An event at or beyond `min_distance` closes the region, anchors a new one
//!   and is emitted unconditionally.
//!
//! A re-emission for the active region replaces the earlier emission for the
//! same gate; [`CanonicalPoint::supersedes`] tells the caller which case it is.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use gatelap_perception::passage_filter::PassageFilter;
//! use gatelap_types::{BilateralRanges, Orientation, PassageEvent, Position, Side, Velocity};
//!
//! let event = |x: f64, left: f64, roll: f64| PassageEvent {
//!     position: Position::new(x, 0.0, 1.0),
//!     orientation: Orientation::new(roll, 0.0, 0.0),
//!     velocity: Velocity::default(),
//!     side: Side::Left,
//!     ranges: BilateralRanges::new(left, 0.4),
//!     timestamp: Utc::now(),
//! };
//!
//! let mut filter = PassageFilter::new();
//! let first = filter.add_event(event(0.0, 0.1, 0.2)).unwrap();
//! assert!(!first.supersedes);
//!
//! // Same gate, better on both metrics: re-emitted as the new best.
//! let better = filter.add_event(event(0.3, 0.35, 0.05)).unwrap();
//! assert!(better.supersedes);
//! assert_eq!(better.region_id, first.region_id);
//!
//! // Next gate, 5 m on.
//! let next = filter.add_event(event(5.0, 0.2, 0.3)).unwrap();
//! assert_eq!(next.region_id, first.region_id + 1);
//! ```

use gatelap_types::{PassageEvent, Position};
use tracing::debug;

/// Planar radius (metres) within which triggers belong to the same gate.
pub const DEFAULT_MIN_DISTANCE: f64 = 2.0;

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// The representative sample chosen for a gate.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPoint {
    /// Region the sample belongs to.  Regions are numbered from 0 in the order
    /// they were opened.
    pub region_id: u32,
    /// `true` when this replaces an earlier emission for the same region.
    pub supersedes: bool,
    pub event: PassageEvent,
}

// ────────────────────────────────────────────────────────────────────────────
// Region state
// ────────────────────────────────────────────────────────────────────────────

/// One cluster of triggers belonging to a single gate.
#[derive(Debug, Clone)]
struct PassageRegion {
    id: u32,
    /// Only x and y are used for membership.
    anchor: Position,
    best: PassageEvent,
    members: usize,
}

impl PassageRegion {
    fn open(id: u32, event: PassageEvent) -> Self {
        Self {
            id,
            anchor: event.position,
            best: event,
            members: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
enum FilterState {
    #[default]
    NoRegion,
    InRegion(PassageRegion),
}

/// `true` when `candidate` strictly beats `best` on centring *and* stability.
fn is_better(candidate: &PassageEvent, best: &PassageEvent) -> bool {
    candidate.ranges.imbalance() < best.ranges.imbalance()
        && candidate.orientation.instability() < best.orientation.instability()
}

// ────────────────────────────────────────────────────────────────────────────
// PassageFilter
// ────────────────────────────────────────────────────────────────────────────

/// Debounces raw passage events into one [`CanonicalPoint`] per gate.
///
/// One instance lives for a recording session; construct a fresh one to reset.
#[derive(Debug, Clone)]
pub struct PassageFilter {
    min_distance: f64,
    state: FilterState,
    /// Number of region rollovers so far; becomes the next region's id.
    region_counter: u32,
}

impl Default for PassageFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PassageFilter {
    /// Create a filter with the default 2 m region radius.
    pub fn new() -> Self {
        Self::with_min_distance(DEFAULT_MIN_DISTANCE)
    }

    /// Create a filter with a custom planar region radius.
    pub fn with_min_distance(min_distance: f64) -> Self {
        Self {
            min_distance,
            state: FilterState::NoRegion,
            region_counter: 0,
        }
    }

    /// Feed one raw event.  Returns the canonical point to record, if any.
    pub fn add_event(&mut self, event: PassageEvent) -> Option<CanonicalPoint> {
        match &mut self.state {
            FilterState::NoRegion => {
                let id = self.region_counter;
                self.state = FilterState::InRegion(PassageRegion::open(id, event.clone()));
                debug!(region = id, "first passage region opened");
                Some(CanonicalPoint {
                    region_id: id,
                    supersedes: false,
                    event,
                })
            }
            FilterState::InRegion(region) => {
                let distance = region.anchor.planar_distance(&event.position);
                if distance < self.min_distance {
                    region.members += 1;
                    if !is_better(&event, &region.best) {
                        return None;
                    }
                    region.best = event.clone();
                    debug!(
                        region = region.id,
                        members = region.members,
                        imbalance = event.ranges.imbalance(),
                        instability = event.orientation.instability(),
                        "passage region best replaced"
                    );
                    Some(CanonicalPoint {
                        region_id: region.id,
                        supersedes: true,
                        event,
                    })
                } else {
                    self.region_counter += 1;
                    let id = self.region_counter;
                    debug!(region = id, distance, "passage region rolled over");
                    *region = PassageRegion::open(id, event.clone());
                    Some(CanonicalPoint {
                        region_id: id,
                        supersedes: false,
                        event,
                    })
                }
            }
        }
    }

    /// Current best sample of the active region, if one is open.
    pub fn current_best(&self) -> Option<&PassageEvent> {
        match &self.state {
            FilterState::NoRegion => None,
            FilterState::InRegion(region) => Some(&region.best),
        }
    }

    /// Id of the active region, if one is open.
    pub fn current_region_id(&self) -> Option<u32> {
        match &self.state {
            FilterState::NoRegion => None,
            FilterState::InRegion(region) => Some(region.id),
        }
    }

    /// Number of raw events absorbed by the active region, including its anchor.
    pub fn region_members(&self) -> usize {
        match &self.state {
            FilterState::NoRegion => 0,
            FilterState::InRegion(region) => region.members,
        }
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatelap_types::{BilateralRanges, Orientation, Side, Velocity};

    fn event(x: f64, y: f64, left: f64, right: f64, roll: f64, pitch: f64) -> PassageEvent {
        PassageEvent {
            position: Position::new(x, y, 1.0),
            orientation: Orientation::new(roll, pitch, 0.0),
            velocity: Velocity::default(),
            side: Side::Left,
            ranges: BilateralRanges::new(left, right),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn first_event_is_emitted_and_anchors_region() {
        let mut f = PassageFilter::new();
        assert!(f.current_best().is_none());
        let p = f.add_event(event(1.0, 1.0, 0.1, 0.4, 0.1, 0.1)).unwrap();
        assert_eq!(p.region_id, 0);
        assert!(!p.supersedes);
        assert_eq!(f.current_region_id(), Some(0));
        assert_eq!(f.region_members(), 1);
    }

    #[test]
    fn worse_event_in_region_is_absorbed_silently() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.2, 0.3, 0.05, 0.05));
        assert!(f.add_event(event(0.5, 0.0, 0.0, 0.4, 0.2, 0.2)).is_none());
        assert_eq!(f.region_members(), 2);
        assert_eq!(f.current_best().unwrap().position.x, 0.0);
    }

    #[test]
    fn improving_only_one_metric_never_replaces_best() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.1, 0.4, 0.1, 0.1));
        // Perfectly centred but shakier.
        assert!(f.add_event(event(0.2, 0.0, 0.25, 0.25, 0.3, 0.0)).is_none());
        // Perfectly level but off-centre.
        assert!(f.add_event(event(0.4, 0.0, 0.0, 0.5, 0.0, 0.0)).is_none());
        assert_eq!(f.current_best().unwrap().position.x, 0.0);
    }

    #[test]
    fn equal_metrics_do_not_replace_best() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.1, 0.3, 0.1, 0.0));
        assert!(f.add_event(event(0.1, 0.0, 0.1, 0.3, 0.1, 0.0)).is_none());
    }

    #[test]
    fn improving_both_metrics_reemits_same_region() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.1, 0.4, 0.1, 0.1));
        let p = f.add_event(event(1.5, 0.5, 0.2, 0.3, 0.05, 0.0)).unwrap();
        assert_eq!(p.region_id, 0);
        assert!(p.supersedes);
        assert_eq!(f.current_best().unwrap().position.x, 1.5);
    }

    #[test]
    fn membership_is_measured_from_anchor_not_best() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.1, 0.4, 0.1, 0.1));
        f.add_event(event(1.5, 0.0, 0.2, 0.3, 0.05, 0.0)).unwrap();
        // 1.0 m from the new best but 2.5 m from the anchor: rollover.
        let p = f.add_event(event(2.5, 0.0, 0.0, 0.4, 0.3, 0.3)).unwrap();
        assert_eq!(p.region_id, 1);
        assert!(!p.supersedes);
    }

    #[test]
    fn rollover_at_exact_min_distance() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.1, 0.4, 0.1, 0.1));
        let p = f.add_event(event(0.0, 2.0, 0.0, 0.5, 0.9, 0.9)).unwrap();
        assert_eq!(p.region_id, 1);
        assert_eq!(f.region_members(), 1);
        assert_eq!(f.current_best().unwrap().position.y, 2.0);
    }

    #[test]
    fn altitude_is_ignored_for_membership() {
        let mut f = PassageFilter::new();
        f.add_event(event(0.0, 0.0, 0.1, 0.4, 0.1, 0.1));
        let mut high = event(0.5, 0.0, 0.0, 0.4, 0.3, 0.3);
        high.position.z = 50.0;
        assert!(f.add_event(high).is_none());
        assert_eq!(f.current_region_id(), Some(0));
    }

    #[test]
    fn custom_min_distance() {
        let mut f = PassageFilter::with_min_distance(0.5);
        assert_eq!(f.min_distance(), 0.5);
        f.add_event(event(0.0, 0.0, 0.1, 0.4, 0.1, 0.1));
        assert_eq!(f.add_event(event(0.6, 0.0, 0.0, 0.4, 0.3, 0.3)).unwrap().region_id, 1);
    }
}
