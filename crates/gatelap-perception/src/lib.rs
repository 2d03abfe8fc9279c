//! `gatelap-perception` – gate passage sensing.
//!
//! Turns the raw per-tick ranging and pose stream into one representative
//! passage sample per physical gate.
//!
//! # Modules
//!
//! - [`passage_detector`] – [`PassageDetector`][passage_detector::PassageDetector]:
//!   fires a [`PassageEvent`][gatelap_types::PassageEvent] whenever either
//!   side of the bilateral ranging pair reads closer than the gate threshold.
//! - [`passage_filter`] – [`PassageFilter`][passage_filter::PassageFilter]:
//!   debounces the repeated triggers of a single gate into a
//!   [`CanonicalPoint`][passage_filter::CanonicalPoint], keeping the steadiest,
//!   best-centred sample of each spatial region.

pub mod passage_detector;
pub mod passage_filter;

pub use passage_detector::{PassageDetector, DEFAULT_LIDAR_THRESHOLD};
pub use passage_filter::{CanonicalPoint, PassageFilter, DEFAULT_MIN_DISTANCE};
