//! Command line runner for steptree behavior trees.
//!
//! Loads a JSON tree definition, registers the demo functions and steps the
//! tree on a fixed interval until it resolves or a step limit is reached.
//!
//! # Examples
//!
//! ```bash
//! # Run the bundled patrol tree with a reproducible seed
//! cargo run -p steptree-cli -- crates/steptree-cli/trees/patrol.json --seed 7
//!
//! # Print the final node states as JSON, with engine debug logs on stderr
//! RUST_LOG=steptree=debug cargo run -p steptree-cli -- trees/patrol.json --inspect
//! ```

mod config;
mod demo;
mod runner;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use config::RunConfig;

/// Step a behavior tree definition from the command line
#[derive(Parser)]
#[command(name = "steptree")]
#[command(about = "Run a step-driven behavior tree", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON tree definition
    #[arg(value_name = "FILE")]
    definition: PathBuf,

    /// Maximum number of steps (overrides STEPTREE_MAX_STEPS)
    #[arg(short = 'n', long, value_name = "STEPS")]
    max_steps: Option<usize>,

    /// Milliseconds between steps (overrides STEPTREE_STEP_INTERVAL_MS)
    #[arg(short, long, value_name = "MS")]
    interval: Option<u64>,

    /// Seed for random draws (overrides STEPTREE_SEED)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Print every node's final state as JSON
    #[arg(long)]
    inspect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunConfig::from_env().with_overrides(cli.max_steps, cli.interval, cli.seed);
    tracing::debug!(?config, "loaded run configuration");

    demo::register().context("Failed to register demo functions")?;

    let mut tree = runner::load_tree(&cli.definition, &config)?;
    let summary = runner::run(&mut tree, &config, |step, state| {
        println!("step {step:>4}: {state}");
    })
    .await?;

    if cli.inspect {
        let details = serde_json::to_string_pretty(&tree.inspect())
            .context("Failed to serialize node details")?;
        println!("{details}");
    }

    if summary.state.is_running() {
        anyhow::bail!(
            "Tree still running after {} steps; raise --max-steps to continue",
            summary.steps
        );
    }

    Ok(())
}
