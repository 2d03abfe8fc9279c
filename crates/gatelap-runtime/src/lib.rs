//! `gatelap-runtime` – lap planning and execution.
//!
//! # Modules
//!
//! - [`planner`] – [`PathPlanner`][planner::PathPlanner]: turns stored
//!   checkpoints into an ordered lap path, inserting corner-cutting
//!   waypoints where the course bends.
//! - [`course`] – [`CourseRunner`][course::CourseRunner]: flies planned laps
//!   through a [`Navigator`][course::Navigator] and writes a route log per
//!   lap.
//! - [`session`] – [`Session`][session::Session]: owns the detector, filter,
//!   checkpoint graph and planner for one control loop and routes recording
//!   ticks through them.
//! - [`sim`] – [`SimNavigator`][sim::SimNavigator]: a kinematic stand-in for
//!   the vehicle, used for headless runs and tests.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with optional OTLP span export.

pub mod course;
pub mod planner;
pub mod session;
pub mod sim;
pub mod telemetry;

pub use course::{CourseConfig, CourseError, CourseReport, CourseRunner, NavigationError, Navigator};
pub use planner::{FlightPath, PathPlanner, PlanError, PlanNode, PlannerOptions, TransitionType};
pub use session::{RecordOutcome, Session, SessionConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
