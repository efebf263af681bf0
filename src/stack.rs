//! The stack: a named, deployable unit of declared resources.
//!
//! Constructs register resources and outputs on a [`Stack`] while they are
//! being declared; [`Stack::synth`] validates the result and produces the
//! [`Template`] handed to the provisioning engine.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::naming;
use crate::template::{pseudo, Output, Resource, Template, Token, PATH_METADATA_KEY};

/// Account and region the stack is bound to.
///
/// `None` leaves the value to the engine (the template then uses the
/// `AWS::AccountId` / `AWS::Region` pseudo parameters).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    /// Target account
    pub account: Option<String>,
    /// Target region
    pub region: Option<String>,
}

impl Environment {
    /// Variable naming the target account.
    pub const ACCOUNT_VAR: &'static str = "CDK_DEFAULT_ACCOUNT";
    /// Variable naming the target region.
    pub const REGION_VAR: &'static str = "CDK_DEFAULT_REGION";
    /// Account used when the variable is unset.
    pub const FALLBACK_ACCOUNT: &'static str = "default_account";
    /// Region used when the variable is unset.
    pub const FALLBACK_REGION: &'static str = "default_region";

    /// A concrete environment.
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
        }
    }

    /// An environment resolved by the engine at deploy time.
    pub fn agnostic() -> Self {
        Self::default()
    }

    /// Read the environment from `CDK_DEFAULT_ACCOUNT` / `CDK_DEFAULT_REGION`,
    /// falling back to literal defaults when unset.
    pub fn from_env() -> Self {
        let account = std::env::var(Self::ACCOUNT_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Self::FALLBACK_ACCOUNT.to_string());
        let region = std::env::var(Self::REGION_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Self::FALLBACK_REGION.to_string());
        Self::new(account, region)
    }
}

/// A stack under construction.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    resources: IndexMap<String, Resource>,
    paths: HashMap<String, String>,
    outputs: IndexMap<String, Output>,
}

impl Stack {
    /// Create an empty stack.
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            name: name.into(),
            env,
            description: None,
            resources: IndexMap::new(),
            paths: HashMap::new(),
            outputs: IndexMap::new(),
        }
    }

    /// Set the template description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound environment.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The region as a token: literal when bound, `AWS::Region` otherwise.
    pub fn region(&self) -> Token {
        match &self.env.region {
            Some(region) => Token::literal(region.clone()),
            None => Token::reference(pseudo::REGION),
        }
    }

    /// The account as a token: literal when bound, `AWS::AccountId` otherwise.
    pub fn account(&self) -> Token {
        match &self.env.account {
            Some(account) => Token::literal(account.clone()),
            None => Token::reference(pseudo::ACCOUNT_ID),
        }
    }

    /// The partition; never known ahead of deployment.
    pub fn partition(&self) -> Token {
        Token::reference(pseudo::PARTITION)
    }

    /// Build an ARN `arn:<partition>:<service>:<region>:<account>:<resource>`.
    pub fn format_arn(&self, service: &str, resource: Vec<Token>) -> Token {
        let mut parts = vec![
            Token::literal("arn:"),
            self.partition(),
            Token::literal(format!(":{}:", service)),
            self.region(),
            Token::literal(":"),
            self.account(),
            Token::literal(":"),
        ];
        parts.extend(resource);
        Token::join("", parts)
    }

    /// Register a resource at a construct path and return its logical id.
    pub fn add_resource(&mut self, path: &str, resource: Resource) -> Result<String> {
        if self.paths.contains_key(path) {
            return Err(Error::DuplicateConstruct(path.to_string()));
        }
        let logical_id = naming::logical_id(path)
            .ok_or_else(|| Error::validation(path, "construct path has no usable components"))?;
        if self.resources.contains_key(&logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id));
        }

        let mut resource = resource;
        resource.metadata.insert(
            PATH_METADATA_KEY.to_string(),
            Value::String(format!("{}/{}", self.name, path)),
        );

        debug!(
            path = %path,
            logical_id = %logical_id,
            resource_type = %resource.resource_type,
            "Declared resource"
        );

        self.paths.insert(path.to_string(), logical_id.clone());
        self.resources.insert(logical_id.clone(), resource);
        Ok(logical_id)
    }

    /// Mutable access to a declared resource.
    pub fn resource_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(logical_id)
    }

    /// A declared resource.
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Logical id declared at a construct path.
    pub fn logical_id_at(&self, path: &str) -> Option<&str> {
        self.paths.get(path).map(String::as_str)
    }

    /// Number of declared resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Register an output.
    pub fn add_output(&mut self, id: &str, output: Output) -> Result<()> {
        let output_id = naming::logical_id(id)
            .ok_or_else(|| Error::validation(id, "output id has no usable characters"))?;
        if self.outputs.contains_key(&output_id) {
            return Err(Error::DuplicateOutput(output_id));
        }
        if let Some(export) = output.export_name() {
            if let Some((other, _)) = self
                .outputs
                .iter()
                .find(|(_, o)| o.export_name() == Some(export))
            {
                return Err(Error::DuplicateExport {
                    export: export.to_string(),
                    first: other.clone(),
                    second: output_id,
                });
            }
        }
        debug!(output = %output_id, export = ?output.export_name(), "Declared output");
        self.outputs.insert(output_id, output);
        Ok(())
    }

    /// Validate the declared graph and produce the template.
    pub fn synth(&self) -> Result<Template> {
        let template = Template {
            description: self.description.clone(),
            resources: self.resources.clone(),
            outputs: self.outputs.clone(),
            ..Template::default()
        };

        let graph = ResourceGraph::from_template(&template)?;
        if graph.has_cycles() {
            let cycles: Vec<String> = graph
                .get_cycles()
                .into_iter()
                .map(|c| c.join(" -> "))
                .collect();
            return Err(Error::DependencyCycle(cycles.join("; ")));
        }

        info!(
            stack = %self.name,
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "Synthesized stack"
        );
        Ok(template)
    }
}
