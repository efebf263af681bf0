//! Diff command
//!
//! Compares the current template either against a template on disk (for
//! example the one last deployed) or against the same stack with a few
//! settings overridden. Exits with 1 when there are changes.

use super::CommandContext;
use anyhow::{Context, Result};
use clap::Parser;
use pgstack::config::StackRevision;
use pgstack::constructs::ec2::InstanceType;
use pgstack::diff::TemplateDiff;
use pgstack::template::Template;
use std::path::PathBuf;

/// Arguments for the diff command
#[derive(Parser, Debug, Clone)]
pub struct DiffArgs {
    /// Template file to compare against (JSON or YAML)
    #[arg(long, conflicts_with_all = ["instance_type", "allocated_storage", "engine_version", "against_revision"])]
    pub against: Option<PathBuf>,

    /// Instance type to compare with (e.g. t3.small)
    #[arg(long)]
    pub instance_type: Option<InstanceType>,

    /// Allocated storage in GiB to compare with
    #[arg(long)]
    pub allocated_storage: Option<u32>,

    /// Engine version to compare with
    #[arg(long)]
    pub engine_version: Option<String>,

    /// Revision to compare with
    #[arg(long)]
    pub against_revision: Option<StackRevision>,
}

impl DiffArgs {
    fn has_overrides(&self) -> bool {
        self.instance_type.is_some()
            || self.allocated_storage.is_some()
            || self.engine_version.is_some()
            || self.against_revision.is_some()
    }

    /// Execute the diff command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let current = ctx.synth()?;

        let diff = if let Some(path) = &self.against {
            let previous = Template::from_path(path)
                .with_context(|| format!("Failed to load template {}", path.display()))?;
            TemplateDiff::between(&previous, &current)
        } else if self.has_overrides() {
            let mut config = ctx.config.clone();
            if let Some(instance_type) = self.instance_type {
                config.database.instance_type = instance_type;
            }
            if let Some(storage) = self.allocated_storage {
                config.database.allocated_storage = storage;
            }
            if let Some(version) = &self.engine_version {
                config.database.engine_version = version.clone();
            }
            if let Some(revision) = self.against_revision {
                config.stack.revision = revision;
            }
            let changed = CommandContext::build_stack_for(&config)?
                .synth()
                .context("Failed to synthesize the overridden stack")?;
            TemplateDiff::between(&current, &changed)
        } else {
            anyhow::bail!(
                "Nothing to compare: pass --against FILE or at least one setting override"
            );
        };

        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!({
                "changes": diff,
                "stats": diff.stats(),
            }))?;
        } else {
            ctx.output.plain(&diff.render(ctx.output.use_color()));
        }

        Ok(if diff.has_changes() { 1 } else { 0 })
    }
}
