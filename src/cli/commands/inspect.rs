//! Inspection commands: list, outputs and graph.

use super::CommandContext;
use anyhow::{Context, Result};
use clap::Parser;
use pgstack::graph::ResourceGraph;
use pgstack::template::{Template, PATH_METADATA_KEY};
use serde::Serialize;
use serde_json::Value;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Only list resources of this type (e.g. AWS::EC2::Subnet)
    #[arg(long = "type", short = 't')]
    pub resource_type: Option<String>,
}

/// Arguments for the outputs command
#[derive(Parser, Debug, Clone)]
pub struct OutputsArgs {}

/// Arguments for the graph command
#[derive(Parser, Debug, Clone)]
pub struct GraphArgs {}

#[derive(Debug, Serialize)]
struct ListedResource<'a> {
    order: usize,
    logical_id: &'a str,
    resource_type: &'a str,
    path: &'a str,
    depends_on: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ListedOutput<'a> {
    id: &'a str,
    export: Option<&'a str>,
    value: &'a Value,
}

impl ListArgs {
    /// Execute the list command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let template = ctx.synth()?;
        let graph = ResourceGraph::from_template(&template)?;
        let order = graph
            .deployment_order()
            .context("Failed to order resources")?;

        let listed: Vec<ListedResource<'_>> = order
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let (logical_id, resource) = template.resources.get_key_value(id)?;
                Some(ListedResource {
                    order: i + 1,
                    logical_id,
                    resource_type: &resource.resource_type,
                    path: resource
                        .metadata
                        .get(PATH_METADATA_KEY)
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                    depends_on: graph.get_dependencies(id),
                })
            })
            .filter(|r| {
                self.resource_type
                    .as_deref()
                    .map_or(true, |t| r.resource_type == t)
            })
            .collect();

        if ctx.output.is_json() {
            ctx.output.json(&listed)?;
            return Ok(0);
        }

        ctx.output.section(&format!("Resources ({})", listed.len()));
        let mut headers = vec!["#", "Logical ID", "Type"];
        if ctx.verbosity >= 1 {
            headers.push("Path");
        }
        let rows: Vec<Vec<String>> = listed
            .iter()
            .map(|r| {
                let mut row = vec![
                    r.order.to_string(),
                    r.logical_id.to_string(),
                    r.resource_type.to_string(),
                ];
                if ctx.verbosity >= 1 {
                    row.push(r.path.to_string());
                }
                row
            })
            .collect();
        ctx.output.table(&headers, &rows);
        Ok(0)
    }
}

impl OutputsArgs {
    /// Execute the outputs command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let template = ctx.synth()?;
        let listed = listed_outputs(&template);

        if ctx.output.is_json() {
            ctx.output.json(&listed)?;
            return Ok(0);
        }

        ctx.output.section(&format!("Outputs ({})", listed.len()));
        let rows: Vec<Vec<String>> = listed
            .iter()
            .map(|o| {
                vec![
                    o.id.to_string(),
                    o.export.unwrap_or("-").to_string(),
                    serde_json::to_string(o.value).unwrap_or_default(),
                ]
            })
            .collect();
        ctx.output.table(&["Output", "Export", "Value"], &rows);
        Ok(0)
    }
}

fn listed_outputs(template: &Template) -> Vec<ListedOutput<'_>> {
    template
        .outputs
        .iter()
        .map(|(id, output)| ListedOutput {
            id,
            export: output.export_name(),
            value: &output.value,
        })
        .collect()
}

impl GraphArgs {
    /// Execute the graph command
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let template = ctx.synth()?;
        let graph = ResourceGraph::from_template(&template)?;
        ctx.output.info(&format!(
            "{} resource(s), {} dependenc(ies)",
            graph.node_count(),
            graph.edge_count()
        ));
        ctx.output.plain(&graph.to_dot());
        Ok(0)
    }
}
