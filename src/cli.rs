// ABOUTME: Command-line interface definition for the gordon daemon.
// ABOUTME: Uses clap derive for argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gordon")]
#[command(about = "Single-node container orchestrator with zero-downtime deploys")]
#[command(version)]
pub struct Cli {
    /// Path to the settings file (defaults to ./gordon.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestrator daemon
    Serve,

    /// Validate the settings file and exit
    Check,
}
