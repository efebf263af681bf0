//! pgstack - RDS Postgres stack synthesizer
//!
//! This is the main entry point for the pgstack CLI.

mod cli;

use anyhow::{Context, Result};
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use pgstack::config::{Config, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(revision) = cli.revision {
        config.stack.revision = revision;
    }

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), &config.logging);

    if cli.verbosity() >= 2 {
        eprintln!("pgstack v{}", VERSION);
    }

    let ctx = CommandContext::new(&cli, config);

    // Execute the appropriate command
    let exit_code = match &cli.command {
        Commands::Synth(args) => args.execute(&ctx)?,
        Commands::List(args) => args.execute(&ctx)?,
        Commands::Outputs(args) => args.execute(&ctx)?,
        Commands::Graph(args) => args.execute(&ctx)?,
        Commands::Diff(args) => args.execute(&ctx)?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays a clean template.
    if logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .with(env_filter)
            .init();
    }
}
