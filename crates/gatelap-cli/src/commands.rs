//! Subcommand parsing and rendering.
//!
//! Every command only reads the checkpoint document.  Rendering returns a
//! `String` so the output can be asserted on in tests.

use std::fmt::Write as _;

use colored::Colorize;
use gatelap_memory::{CheckpointDocument, CheckpointGraph, CheckpointId};
use gatelap_runtime::planner::{FlightPath, PathPlanner, PlanError, PlanNode, TransitionType};

use crate::config::Config;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    /// List stored checkpoints and their edges.
    Checkpoints,
    /// Print the lap path; defaults to first → last checkpoint.
    Plan { range: Option<(CheckpointId, CheckpointId)> },
    /// Print the JSON Schema of the checkpoint document.
    Schema,
    /// Print the effective configuration.
    Config,
    /// Write a default config file if none exists.
    ConfigInit,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        match words.as_slice() {
            [] | ["help"] | ["-h"] | ["--help"] => Ok(Command::Help),
            ["checkpoints"] => Ok(Command::Checkpoints),
            ["plan"] => Ok(Command::Plan { range: None }),
            ["plan", start, goal] => {
                let start = parse_id(start)?;
                let goal = parse_id(goal)?;
                Ok(Command::Plan {
                    range: Some((start, goal)),
                })
            }
            ["plan", ..] => Err("plan takes either no arguments or START GOAL".to_string()),
            ["schema"] => Ok(Command::Schema),
            ["config"] => Ok(Command::Config),
            ["config", "init"] => Ok(Command::ConfigInit),
            [other, ..] => Err(format!("unknown command '{other}'")),
        }
    }
}

fn parse_id(raw: &str) -> Result<CheckpointId, String> {
    raw.parse::<CheckpointId>()
        .map_err(|_| format!("'{raw}' is not a checkpoint id"))
}

pub fn usage() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Usage: gatelap <command>".bold());
    let _ = writeln!(out);
    let _ = writeln!(out, "  {}          list stored gates and their edges", "checkpoints".cyan());
    let _ = writeln!(out, "  {} [START GOAL]    print the lap path", "plan".cyan());
    let _ = writeln!(out, "  {}               print the checkpoint document JSON Schema", "schema".cyan());
    let _ = writeln!(out, "  {}               print the effective configuration", "config".cyan());
    let _ = writeln!(out, "  {}          write a default ~/.gatelap/config.toml", "config init".cyan());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderers
// ─────────────────────────────────────────────────────────────────────────────

pub fn render_checkpoints(graph: &CheckpointGraph) -> String {
    let mut out = String::new();
    if graph.is_empty() {
        let _ = writeln!(out, "  {}", "No checkpoints recorded.".dimmed());
        return out;
    }
    let _ = writeln!(
        out,
        "  {} checkpoint(s), last id {}",
        graph.len().to_string().bold(),
        graph.last_checkpoint_id()
    );
    for node in graph.checkpoints() {
        let side = node
            .last_passage()
            .map(|p| p.approach_side.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:>4}  ({:>7.2}, {:>7.2}, {:>6.2})  passes {:<3} side {}",
            format!("#{}", node.id).bold(),
            node.position.x,
            node.position.y,
            node.position.z,
            node.passage_history.len(),
            side
        );
        for edge in &node.connections {
            let _ = writeln!(out, "          → #{} {:.2} m", edge.to_checkpoint_id, edge.distance);
        }
    }
    out
}

/// Plan over `graph` and render the waypoints.
pub fn plan(
    graph: &CheckpointGraph,
    planner: &PathPlanner,
    range: Option<(CheckpointId, CheckpointId)>,
) -> Result<FlightPath, PlanError> {
    let nodes = PlanNode::from_graph(graph);
    let (start, goal) = match range {
        Some(r) => r,
        None => match (nodes.first(), nodes.last()) {
            (Some(first), Some(last)) => (first.id, last.id),
            _ => return Err(PlanError::NoCheckpoints),
        },
    };
    planner.build_path(start, goal, &nodes)
}

pub fn render_path(path: &FlightPath) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {} waypoint(s), {} corner",
        path.len().to_string().bold(),
        path.synthetic_count()
    );
    for (i, wp) in path.iter().enumerate() {
        let turn = match wp.transition {
            TransitionType::Straight => "straight",
            TransitionType::TurnLeft => "left",
            TransitionType::TurnRight => "right",
        };
        let kind = if wp.is_synthetic {
            "corner".yellow().to_string()
        } else {
            "gate".green().to_string()
        };
        let _ = writeln!(
            out,
            "  {:>3}. #{:<4} {:<6} ({:>7.2}, {:>7.2}, {:>6.2})  {}",
            i + 1,
            wp.id,
            kind,
            wp.position.x,
            wp.position.y,
            wp.position.z,
            turn
        );
    }
    out
}

pub fn render_schema() -> Result<String, String> {
    serde_json::to_string_pretty(&CheckpointDocument::json_schema())
        .map_err(|e| format!("Failed to render schema: {e}"))
}

pub fn render_config(cfg: &Config) -> Result<String, String> {
    toml::to_string_pretty(cfg).map_err(|e| format!("Failed to render config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatelap_memory::GraphOptions;
    use gatelap_types::{BilateralRanges, PassageEvent, PoseSample, Position};

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn graph(points: &[(f64, f64)]) -> CheckpointGraph {
        colored::control::set_override(false);
        let mut g = CheckpointGraph::in_memory(GraphOptions::default());
        for &(x, y) in points {
            let sample = PoseSample {
                position: Position::new(x, y, 1.0),
                ..Default::default()
            };
            let event = PassageEvent::from_sample(&sample, BilateralRanges::new(0.2, 0.4), Utc::now());
            g.add_checkpoint(sample.position, &event).unwrap();
        }
        g
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse(&args(&[])).unwrap(), Command::Help);
        assert_eq!(Command::parse(&args(&["checkpoints"])).unwrap(), Command::Checkpoints);
        assert_eq!(Command::parse(&args(&["plan"])).unwrap(), Command::Plan { range: None });
        assert_eq!(
            Command::parse(&args(&["plan", "2", "5"])).unwrap(),
            Command::Plan { range: Some((2, 5)) }
        );
        assert_eq!(Command::parse(&args(&["config", "init"])).unwrap(), Command::ConfigInit);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Command::parse(&args(&["plan", "1"])).is_err());
        assert!(Command::parse(&args(&["plan", "one", "2"])).is_err());
        assert!(Command::parse(&args(&["fly"])).is_err());
    }

    #[test]
    fn empty_graph_renders_notice() {
        let out = render_checkpoints(&graph(&[]));
        assert!(out.contains("No checkpoints recorded."));
    }

    #[test]
    fn checkpoints_list_edges() {
        let out = render_checkpoints(&graph(&[(0.0, 0.0), (2.0, 0.0), (10.0, 0.0)]));
        assert!(out.contains("3 checkpoint(s), last id 3"));
        assert!(out.contains("→ #2 2.00 m"));
        assert!(out.contains("→ #1 2.00 m"));
        assert!(out.contains("side left"));
    }

    #[test]
    fn plan_defaults_to_first_and_last() {
        let g = graph(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]);
        let path = plan(&g, &PathPlanner::default(), None).unwrap();
        assert_eq!(path.ids(), vec![1, 2, 2, 3]);

        let out = render_path(&path);
        assert!(out.contains("4 waypoint(s), 1 corner"));
        assert!(out.contains("corner"));
    }

    #[test]
    fn plan_errors_surface() {
        let planner = PathPlanner::default();
        assert_eq!(plan(&graph(&[]), &planner, None), Err(PlanError::NoCheckpoints));
        let g = graph(&[(0.0, 0.0), (3.0, 0.0)]);
        assert_eq!(
            plan(&g, &planner, Some((2, 1))),
            Err(PlanError::GoalBeforeStart { start: 2, goal: 1 })
        );
    }

    #[test]
    fn schema_names_document_fields() {
        let schema = render_schema().unwrap();
        assert!(schema.contains("checkpoints"));
        assert!(schema.contains("last_checkpoint_id"));
    }

    #[test]
    fn config_renders_as_toml() {
        let out = render_config(&Config::default()).unwrap();
        assert!(out.contains("[session]"));
        assert!(out.contains("lidar_threshold = 0.5"));
    }
}
