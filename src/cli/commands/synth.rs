//! Synth command
//!
//! Prints the synthesized template, or writes it to a file.

use super::CommandContext;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pgstack::template::TemplateFormat;
use std::path::PathBuf;

/// Template serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

impl From<FormatArg> for TemplateFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => TemplateFormat::Json,
            FormatArg::Yaml => TemplateFormat::Yaml,
        }
    }
}

/// Arguments for the synth command
#[derive(Parser, Debug, Clone)]
pub struct SynthArgs {
    /// Write the template to this file instead of stdout
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Template format (defaults to the file extension, then JSON)
    #[arg(long, short = 'f')]
    pub format: Option<FormatArg>,
}

impl SynthArgs {
    /// Execute the synth command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let template = ctx.synth()?;

        let format = match (self.format, &self.out) {
            (Some(arg), _) => arg.into(),
            (None, Some(path)) => TemplateFormat::from_path(path),
            (None, None) => TemplateFormat::Json,
        };

        match &self.out {
            Some(path) => {
                template
                    .write_to(path, format)
                    .with_context(|| format!("Failed to write template to {}", path.display()))?;
                ctx.output.info(&format!(
                    "Wrote {} resource(s) and {} output(s) to {}",
                    template.resources.len(),
                    template.outputs.len(),
                    path.display()
                ));
            }
            None => {
                ctx.output.plain(&template.render(format)?);
                ctx.output.flush();
            }
        }

        Ok(0)
    }
}
