//! Subcommands module for pgstack CLI
//!
//! This module contains all the subcommand implementations.

pub mod diff;
pub mod inspect;
pub mod synth;

use crate::cli::output::OutputFormatter;
use anyhow::{Context, Result};
use pgstack::config::Config;
use pgstack::stacks::RdsPostgresStack;
use pgstack::template::Template;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity());

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
        }
    }

    /// Declare the stack for the loaded configuration
    pub fn build_stack(&self) -> Result<RdsPostgresStack> {
        Self::build_stack_for(&self.config)
    }

    /// Declare the stack for an arbitrary configuration
    pub fn build_stack_for(config: &Config) -> Result<RdsPostgresStack> {
        RdsPostgresStack::build(config).with_context(|| {
            format!(
                "Failed to declare stack '{}' ({})",
                config.stack.name, config.stack.revision
            )
        })
    }

    /// Declare and synthesize the stack
    pub fn synth(&self) -> Result<Template> {
        let stack = self.build_stack()?;
        self.output.info(&format!(
            "Declared {} resource(s) in stack {}",
            stack.stack.resource_count(),
            stack.stack.name()
        ));
        stack
            .synth()
            .with_context(|| format!("Failed to synthesize stack '{}'", stack.stack.name()))
    }
}
