//! Gate Passage Detector.
//!
//! A gate is a ring the vehicle flies through.  While threading it, one of the
//! two side-looking rangefinders sees the ring closer than the ring radius.
//! [`PassageDetector`] watches each tick's [`BilateralRanges`] and, when either
//! reading drops under the threshold, stamps the current pose into a
//! [`PassageEvent`].
//!
//! A single physical gate triggers the detector on many consecutive ticks;
//! collapsing those into one sample is the job of
//! [`PassageFilter`][crate::passage_filter::PassageFilter].
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use gatelap_perception::passage_detector::PassageDetector;
//! use gatelap_types::{BilateralRanges, PoseSample, Side};
//!
//! let detector = PassageDetector::default();
//! let pose = PoseSample::default();
//!
//! // Open air on both sides: nothing fires.
//! assert!(detector.detect(&pose, BilateralRanges::new(2.0, 2.0), Utc::now()).is_none());
//!
//! // Left post 0.3 m away: passage on the left side.
//! let event = detector.detect(&pose, BilateralRanges::new(0.3, 0.8), Utc::now()).unwrap();
//! assert_eq!(event.side, Side::Left);
//! ```

use chrono::{DateTime, Utc};
use gatelap_types::{BilateralRanges, PassageEvent, PoseSample};
use tracing::trace;

/// Range (metres) below which a side reading counts as a gate post.
/// Matches the 0.5 m ring radius of the reference course.
pub const DEFAULT_LIDAR_THRESHOLD: f64 = 0.5;

/// Threshold trigger over the bilateral ranging pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassageDetector {
    threshold: f64,
}

impl Default for PassageDetector {
    fn default() -> Self {
        Self::new(DEFAULT_LIDAR_THRESHOLD)
    }
}

impl PassageDetector {
    /// Create a detector firing when either range is strictly below `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns `true` when this reading should be treated as a gate passage.
    pub fn is_triggered(&self, ranges: BilateralRanges) -> bool {
        ranges.left < self.threshold || ranges.right < self.threshold
    }

    /// Produce a [`PassageEvent`] for this tick, or `None` when neither side
    /// is within the threshold.
    pub fn detect(
        &self,
        sample: &PoseSample,
        ranges: BilateralRanges,
        timestamp: DateTime<Utc>,
    ) -> Option<PassageEvent> {
        if !self.is_triggered(ranges) {
            return None;
        }
        let event = PassageEvent::from_sample(sample, ranges, timestamp);
        trace!(
            x = event.position.x,
            y = event.position.y,
            side = %event.side,
            left = ranges.left,
            right = ranges.right,
            "passage trigger"
        );
        Some(event)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gatelap_types::{Position, Side};

    fn pose_at(x: f64, y: f64) -> PoseSample {
        PoseSample {
            position: Position::new(x, y, 1.0),
            ..PoseSample::default()
        }
    }

    #[test]
    fn no_trigger_at_threshold() {
        let d = PassageDetector::new(0.5);
        assert!(!d.is_triggered(BilateralRanges::new(0.5, 0.5)));
        assert!(d.detect(&pose_at(0.0, 0.0), BilateralRanges::new(0.5, 3.0), Utc::now()).is_none());
    }

    #[test]
    fn right_side_trigger() {
        let d = PassageDetector::default();
        let e = d
            .detect(&pose_at(4.0, -1.0), BilateralRanges::new(1.2, 0.1), Utc::now())
            .expect("right post within threshold");
        assert_eq!(e.side, Side::Right);
        assert_eq!(e.position, Position::new(4.0, -1.0, 1.0));
        assert_eq!(e.ranges, BilateralRanges::new(1.2, 0.1));
    }

    #[test]
    fn both_sides_close_picks_nearer() {
        let d = PassageDetector::default();
        let e = d
            .detect(&pose_at(0.0, 0.0), BilateralRanges::new(0.2, 0.3), Utc::now())
            .unwrap();
        assert_eq!(e.side, Side::Left);
    }

    #[test]
    fn custom_threshold() {
        let d = PassageDetector::new(1.0);
        assert_eq!(d.threshold(), 1.0);
        assert!(d.is_triggered(BilateralRanges::new(0.9, 5.0)));
    }
}
