//! CLI module for pgstack
//!
//! This module provides the command-line interface for pgstack,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use pgstack::config::StackRevision;
use std::path::PathBuf;

/// pgstack - RDS Postgres stack synthesizer
///
/// Declares the VPC, database, secret and IAM role of the Postgres stack and
/// prints the resulting CloudFormation template.
#[derive(Parser, Debug, Clone)]
#[command(name = "pgstack")]
#[command(author = "pgstack Contributors")]
#[command(version)]
#[command(about = "Synthesize the RDS Postgres CloudFormation stack", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "PGSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Stack revision to synthesize (baseline, single-nat, endpoints)
    #[arg(long, global = true)]
    pub revision: Option<StackRevision>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print or write the synthesized template
    Synth(commands::synth::SynthArgs),

    /// List resources in deployment order
    List(commands::inspect::ListArgs),

    /// Show stack outputs and their exports
    Outputs(commands::inspect::OutputsArgs),

    /// Print the resource dependency graph as Graphviz DOT
    Graph(commands::inspect::GraphArgs),

    /// Compare the template against a file or overridden settings
    Diff(commands::diff::DiffArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}
