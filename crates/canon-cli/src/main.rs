//! # canon CLI
//!
//! Command-line interface for canonpath per-action path remapping.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use canon_config::{log_cli_debug, log_cli_info, Config};
use canon_remap::{ExecPath, MetadataProvider, PathMapper, Remapper};
use clap::{Parser, Subcommand};
use serde::Serialize;

mod action;

use action::{ActionInputs, ActionSpec};

/// canonpath - content-addressed path remapping for build actions
#[derive(Parser)]
#[command(name = "canon")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the path mapping an action would run with
    Plan {
        /// Action description (JSON)
        #[arg(value_name = "ACTION")]
        action: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the virtual input tree for an action
    Materialize {
        #[arg(value_name = "ACTION")]
        action: PathBuf,

        /// Execution root the action's paths are relative to
        #[arg(long, value_name = "DIR", default_value = ".")]
        exec_root: PathBuf,
    },

    /// Print the runfiles location of a derived path
    Runfiles {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration as TOML
    Show,
    /// Show the configuration file locations
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    canon_config::reload().context("Failed to load configuration")?;
    let config = canon_config::config().clone();
    canon_config::init_logging(config.logging.level);
    log_cli_debug!("Loaded configuration", level = config.logging.level.as_str());

    let remapper = Remapper::from_config(&config).context("Invalid configuration")?;

    match cli.command {
        Commands::Plan { action, json } => cmd_plan(&remapper, &action, json),
        Commands::Materialize { action, exec_root } => {
            cmd_materialize(&remapper, &action, &exec_root)
        }
        Commands::Runfiles { path } => {
            let path = ExecPath::new(path).context("Invalid exec path")?;
            println!("{}", remapper.runfiles_path(&path));
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to render configuration")?
                );
                Ok(())
            }
            ConfigCommands::Path => {
                match Config::global_config_path() {
                    Some(p) => println!("Global:  {}", p.display()),
                    None => println!("Global:  (no home directory)"),
                }
                println!("Project: .canon/config.toml");
                Ok(())
            }
        },
    }
}

/// Build the mapper for the action described in `path`.
fn build_mapper(remapper: &Remapper, path: &Path) -> Result<(ActionSpec, PathMapper)> {
    let spec = ActionSpec::load(path)?;
    let ActionInputs {
        artifacts,
        aggregates,
        digests,
    } = spec.inputs()?;

    let metadata: Option<&dyn MetadataProvider> = if spec.metadata {
        Some(&digests)
    } else {
        None
    };
    let mapper = remapper.build(&spec.requirements, &aggregates, metadata, &artifacts);
    let action = path.display().to_string();
    log_cli_info!(
        "Planned action",
        action = action.as_str(),
        identity = mapper.is_identity()
    );
    Ok((spec, mapper))
}

#[derive(Debug, Serialize)]
struct PlanReport {
    nonce: Option<String>,
    materialize: bool,
    entries: Vec<PlanEntry>,
    args: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PlanEntry {
    from: String,
    to: String,
}

impl PlanReport {
    fn new(spec: &ActionSpec, mapper: &PathMapper) -> Self {
        Self {
            nonce: mapper.nonce().map(str::to_string),
            materialize: mapper.materializes_inputs(),
            entries: mapper
                .entries()
                .into_iter()
                .map(|(from, to)| PlanEntry {
                    from: from.to_string(),
                    to: to.to_string(),
                })
                .collect(),
            args: mapper.rewrite_args(&spec.args, &spec.outputs),
        }
    }
}

fn cmd_plan(remapper: &Remapper, action: &Path, json: bool) -> Result<()> {
    let (spec, mapper) = build_mapper(remapper, action)?;
    let report = PlanReport::new(&spec, &mapper);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &report.nonce {
        None => println!("identity mapping (paths unchanged)"),
        Some(nonce) => {
            println!("nonce:       {}", nonce);
            println!(
                "materialize: {}",
                if report.materialize { "yes" } else { "no" }
            );
            for entry in &report.entries {
                println!("  {} -> {}", entry.from, entry.to);
            }
        }
    }
    if !report.args.is_empty() {
        println!("args: {}", report.args.join(" "));
    }
    Ok(())
}

fn cmd_materialize(remapper: &Remapper, action: &Path, exec_root: &Path) -> Result<()> {
    let (_, mapper) = build_mapper(remapper, action)?;

    if !mapper.materializes_inputs() {
        println!("Action does not request materialized inputs");
        return Ok(());
    }

    let published = mapper
        .materialize(exec_root)
        .with_context(|| format!("Failed to materialize under {}", exec_root.display()))?;
    println!(
        "Materialized {} virtual paths ({} links) under {}",
        mapper.entries().len(),
        published,
        exec_root.display()
    );
    Ok(())
}
