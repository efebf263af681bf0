//! Synthesized template model.
//!
//! This is the static document handed to the provisioning engine: an ordered
//! map of resources and an ordered map of outputs. Resource and output order
//! follows declaration order so that synthesis is byte-for-byte stable.

pub mod intrinsic;

pub use intrinsic::{collect_references, pseudo, Token};

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// Template format version understood by the engine.
pub const FORMAT_VERSION: &str = "2010-09-09";

/// Metadata key recording the construct path a resource was declared at.
pub const PATH_METADATA_KEY: &str = "aws:cdk:path";

/// On-disk serialization of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl TemplateFormat {
    /// `.yml`/`.yaml` is YAML, anything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => TemplateFormat::Yaml,
            _ => TemplateFormat::Json,
        }
    }
}

/// What the engine does with a resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Remove the physical resource
    Delete,
    /// Keep the physical resource
    Retain,
    /// Take a final snapshot, then remove
    Snapshot,
}

/// A single resource descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Resource type, e.g. `AWS::EC2::VPC`
    #[serde(rename = "Type")]
    pub resource_type: String,

    /// Resource properties
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    /// Explicit ordering dependencies
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub depends_on: Vec<String>,

    /// Behavior on removal from the template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    /// Behavior when an update requires replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Resource {
    /// Create a resource of the given type with no properties.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
            metadata: Map::new(),
        }
    }

    /// Set a property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set a property only when a value is present.
    pub fn optional_property<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.property(key, v),
            None => self,
        }
    }

    /// Add an explicit dependency on another logical id.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let id = logical_id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    /// Set both the deletion and the update-replace policy.
    pub fn with_policies(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Logical ids referenced from properties or `DependsOn`.
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for value in self.properties.values() {
            collect_references(value, &mut out);
        }
        out.extend(self.depends_on.iter().cloned());
        out
    }

    /// Look up a property by dotted path (`Endpoint.Port`, `SubnetIds.0`).
    pub fn property_at(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.properties.get(first)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn string_or_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Export block of an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    /// Export name visible to other stacks
    pub name: String,
}

/// A named stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Optional human description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Output value (literal or expression)
    pub value: Value,

    /// Optional cross-stack export
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    /// Create an output from a token.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            description: None,
            value: value.into(),
            export: None,
        }
    }

    /// Export the output under `name`.
    pub fn with_export(mut self, name: impl Into<String>) -> Self {
        self.export = Some(Export { name: name.into() });
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The export name, if exported.
    pub fn export_name(&self) -> Option<&str> {
        self.export.as_ref().map(|e| e.name.as_str())
    }

    /// Whether the value would render as something non-empty.
    pub fn has_value(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }
}

/// A complete synthesized template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Format version
    #[serde(rename = "AWSTemplateFormatVersion", default = "default_format_version")]
    pub format_version: String,

    /// Template description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resources by logical id
    #[serde(default)]
    pub resources: IndexMap<String, Resource>,

    /// Outputs by id
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

fn default_format_version() -> String {
    FORMAT_VERSION.to_string()
}

impl Default for Template {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            description: None,
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }
}

impl Template {
    /// Resources of a given type, in declaration order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    /// Number of resources of a given type.
    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    /// Pretty JSON rendering.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// YAML rendering.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a template from JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a template from YAML.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Render in the given format.
    pub fn render(&self, format: TemplateFormat) -> Result<String> {
        match format {
            TemplateFormat::Json => self.to_json_pretty(),
            TemplateFormat::Yaml => self.to_yaml(),
        }
    }

    /// Load a template from disk, choosing the parser by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match TemplateFormat::from_path(path) {
            TemplateFormat::Yaml => Self::from_yaml_str(&content),
            TemplateFormat::Json => Self::from_json_str(&content),
        }
    }

    /// Write the template to disk.
    pub fn write_to(&self, path: impl AsRef<Path>, format: TemplateFormat) -> Result<()> {
        let path = path.as_ref();
        let content = self.render(format)?;
        std::fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_serialization() {
        let resource = Resource::new("AWS::EC2::VPC")
            .property("CidrBlock", "10.0.0.0/16")
            .property("EnableDnsSupport", true)
            .depends_on("Other")
            .with_policies(DeletionPolicy::Delete);

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(
            value,
            json!({
                "Type": "AWS::EC2::VPC",
                "Properties": {"CidrBlock": "10.0.0.0/16", "EnableDnsSupport": true},
                "DependsOn": ["Other"],
                "DeletionPolicy": "Delete",
                "UpdateReplacePolicy": "Delete"
            })
        );
    }

    #[test]
    fn test_depends_on_accepts_single_string() {
        let resource: Resource =
            serde_json::from_value(json!({"Type": "AWS::EC2::Route", "DependsOn": "Gw"})).unwrap();
        assert_eq!(resource.depends_on, vec!["Gw".to_string()]);
    }

    #[test]
    fn test_property_at() {
        let resource = Resource::new("AWS::RDS::DBSubnetGroup")
            .property("SubnetIds", json!([{"Ref": "A"}, {"Ref": "B"}]));
        assert_eq!(resource.property_at("SubnetIds.1"), Some(&json!({"Ref": "B"})));
        assert_eq!(resource.property_at("SubnetIds.7"), None);
        assert_eq!(resource.property_at("Missing"), None);
    }

    #[test]
    fn test_output_has_value() {
        assert!(Output::new(Token::reference("Vpc")).has_value());
        assert!(!Output::new("").has_value());
        assert!(Output::new("my_initial_database").has_value());
    }

    #[test]
    fn test_template_json_roundtrip_keeps_order() {
        let mut template = Template::default();
        template
            .resources
            .insert("Zeta".into(), Resource::new("AWS::EC2::VPC"));
        template
            .resources
            .insert("Alpha".into(), Resource::new("AWS::EC2::Subnet"));

        let json = template.to_json_pretty().unwrap();
        assert!(json.find("Zeta").unwrap() < json.find("Alpha").unwrap());

        let parsed = Template::from_json_str(&json).unwrap();
        assert_eq!(parsed, template);
    }

    #[test]
    fn test_write_to_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut template = Template::default();
        template.resources.insert(
            "Vpc".into(),
            Resource::new("AWS::EC2::VPC").property("CidrBlock", "10.0.0.0/16"),
        );

        let yaml = dir.path().join("stack.yaml");
        template.write_to(&yaml, TemplateFormat::from_path(&yaml)).unwrap();
        assert!(std::fs::read_to_string(&yaml).unwrap().contains("CidrBlock:"));
        assert_eq!(Template::from_path(&yaml).unwrap(), template);

        let json = dir.path().join("stack.template");
        template.write_to(&json, TemplateFormat::Json).unwrap();
        assert_eq!(TemplateFormat::from_path(&json), TemplateFormat::Json);
        assert_eq!(Template::from_path(&json).unwrap(), template);

        let missing = dir.path().join("absent").join("stack.json");
        assert!(matches!(
            template.write_to(&missing, TemplateFormat::Json),
            Err(Error::Io { .. })
        ));
    }
}
