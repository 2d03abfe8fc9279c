//! `gatelap-cli` – read-only inspection of a gate-lap checkpoint store.
//!
//! This binary:
//!
//! 1. Resolves the effective configuration from `~/.gatelap/config.toml` and
//!    `GATELAP_*` overrides.
//! 2. Opens the checkpoint document named there (a missing or malformed file
//!    reads as an empty store).
//! 3. Lists checkpoints, prints the planned lap path, the document schema or
//!    the configuration.
//!
//! It never writes the checkpoint document.

mod commands;
mod config;

use colored::Colorize;
use gatelap_memory::CheckpointGraph;
use gatelap_runtime::PathPlanner;
use tracing::{debug, error};

use commands::Command;

fn main() {
    let _guard = gatelap_runtime::init_tracing("gatelap-cli");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            eprint!("{}", commands::usage());
            std::process::exit(2);
        }
    };

    let cfg = match config::effective() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            eprintln!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    debug!(checkpoint_file = %cfg.session.checkpoint_file.display(), ?command, "cli start");

    let code = match run(command, &cfg) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("{}: {}", "Error".red(), e);
            1
        }
    };
    std::process::exit(code);
}

fn run(command: Command, cfg: &config::Config) -> Result<(), String> {
    match command {
        Command::Help => print!("{}", commands::usage()),
        Command::Checkpoints => {
            let graph = open_graph(cfg);
            print!("{}", commands::render_checkpoints(&graph));
        }
        Command::Plan { range } => {
            let graph = open_graph(cfg);
            let planner = PathPlanner::new(cfg.session.planner);
            let path = commands::plan(&graph, &planner, range).map_err(|e| e.to_string())?;
            print!("{}", commands::render_path(&path));
        }
        Command::Schema => println!("{}", commands::render_schema()?),
        Command::Config => {
            println!(
                "  {} {}\n",
                "Config file:".dimmed(),
                config::config_path().display().to_string().bold()
            );
            print!("{}", commands::render_config(cfg)?);
        }
        Command::ConfigInit => {
            let path = config::config_path();
            if path.exists() {
                println!("  Config already exists at {}", path.display().to_string().bold());
            } else {
                config::save(&config::Config::default())?;
                println!("  {} Config saved to {}", "✓".green().bold(), path.display().to_string().bold());
            }
        }
    }
    Ok(())
}

fn open_graph(cfg: &config::Config) -> CheckpointGraph {
    let graph = CheckpointGraph::open(&cfg.session.checkpoint_file, cfg.session.graph_options());
    println!(
        "  {} {}\n",
        "Checkpoint file:".dimmed(),
        cfg.session.checkpoint_file.display().to_string().bold()
    );
    graph
}
