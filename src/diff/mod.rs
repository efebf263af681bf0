//! Structural template diff.
//!
//! Compares two templates resource by resource (matched on logical id) and
//! output by output. Resource descriptors are compared field by field;
//! properties are compared key by key, descending into nested objects so a
//! change reports the narrowest path that differs (`Tags` arrays and other
//! lists are compared whole).
//!
//! # Example
//!
//! ```rust,ignore
//! use pgstack::diff::TemplateDiff;
//!
//! let diff = TemplateDiff::between(&deployed, &current);
//! if diff.has_changes() {
//!     println!("{}", diff.render(true));
//! }
//! ```

mod stats;
mod text;

pub use stats::DiffStats;
pub use text::{render_value, unified_diff, value_diff};

use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::template::{Output, Resource, Template};

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Only in the new template
    Added,
    /// Only in the old template
    Removed,
    /// In both, different
    Modified,
}

impl ChangeKind {
    fn symbol(&self) -> &'static str {
        match self {
            ChangeKind::Added => "+",
            ChangeKind::Removed => "-",
            ChangeKind::Modified => "~",
        }
    }
}

/// One changed field of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChange {
    /// Dotted path, e.g. `Properties.DBInstanceClass` or `DeletionPolicy`
    pub path: String,
    /// Old value, absent when added
    pub old: Option<Value>,
    /// New value, absent when removed
    pub new: Option<Value>,
}

/// A changed resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChange {
    /// Logical id
    pub logical_id: String,
    /// Resource type (the new one when it changed)
    pub resource_type: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Field changes; empty unless modified
    pub changes: Vec<PropertyChange>,
}

impl ResourceChange {
    /// Whether the resource type itself changed, which always replaces it.
    pub fn type_changed(&self) -> bool {
        self.changes.iter().any(|c| c.path == "Type")
    }
}

/// A changed output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputChange {
    /// Output id
    pub id: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Old value
    pub old: Option<Value>,
    /// New value
    pub new: Option<Value>,
}

/// Differences between two templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateDiff {
    /// Changed resources, in new-template order then removed ones
    pub resources: Vec<ResourceChange>,
    /// Changed outputs
    pub outputs: Vec<OutputChange>,
}

impl TemplateDiff {
    /// Compare `old` against `new`.
    pub fn between(old: &Template, new: &Template) -> Self {
        let mut resources = Vec::new();

        for (id, new_resource) in &new.resources {
            match old.resources.get(id) {
                None => resources.push(ResourceChange {
                    logical_id: id.clone(),
                    resource_type: new_resource.resource_type.clone(),
                    kind: ChangeKind::Added,
                    changes: Vec::new(),
                }),
                Some(old_resource) => {
                    let changes = resource_changes(old_resource, new_resource);
                    if !changes.is_empty() {
                        resources.push(ResourceChange {
                            logical_id: id.clone(),
                            resource_type: new_resource.resource_type.clone(),
                            kind: ChangeKind::Modified,
                            changes,
                        });
                    }
                }
            }
        }

        for (id, old_resource) in &old.resources {
            if !new.resources.contains_key(id) {
                resources.push(ResourceChange {
                    logical_id: id.clone(),
                    resource_type: old_resource.resource_type.clone(),
                    kind: ChangeKind::Removed,
                    changes: Vec::new(),
                });
            }
        }

        let mut outputs = Vec::new();
        for (id, new_output) in &new.outputs {
            let new_value = output_value(new_output);
            match old.outputs.get(id) {
                None => outputs.push(OutputChange {
                    id: id.clone(),
                    kind: ChangeKind::Added,
                    old: None,
                    new: Some(new_value),
                }),
                Some(old_output) if old_output != new_output => outputs.push(OutputChange {
                    id: id.clone(),
                    kind: ChangeKind::Modified,
                    old: Some(output_value(old_output)),
                    new: Some(new_value),
                }),
                Some(_) => {}
            }
        }
        for (id, old_output) in &old.outputs {
            if !new.outputs.contains_key(id) {
                outputs.push(OutputChange {
                    id: id.clone(),
                    kind: ChangeKind::Removed,
                    old: Some(output_value(old_output)),
                    new: None,
                });
            }
        }

        Self { resources, outputs }
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        !self.resources.is_empty() || !self.outputs.is_empty()
    }

    /// The change recorded for a logical id, if any.
    pub fn resource(&self, logical_id: &str) -> Option<&ResourceChange> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Summary counts
    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::new();
        for change in &self.resources {
            match change.kind {
                ChangeKind::Added => stats.resources_added += 1,
                ChangeKind::Removed => stats.resources_removed += 1,
                ChangeKind::Modified => {
                    stats.resources_modified += 1;
                    stats.property_changes += change.changes.len();
                }
            }
        }
        stats.outputs_changed = self.outputs.len();
        stats
    }

    /// Human-readable rendering.
    pub fn render(&self, use_color: bool) -> String {
        let mut out = String::new();

        if !self.resources.is_empty() {
            out.push_str(&heading("Resources", use_color));
            for change in &self.resources {
                let line = format!(
                    "[{}] {} {}",
                    change.kind.symbol(),
                    change.resource_type,
                    change.logical_id
                );
                out.push_str(&colorize(&line, change.kind, use_color));
                if change.type_changed() {
                    let note = " (requires replacement)";
                    out.push_str(&if use_color { note.red().to_string() } else { note.to_string() });
                }
                out.push('\n');
                for property in &change.changes {
                    out.push_str(&format!("    {}\n", property.path));
                    let body = value_diff(property.old.as_ref(), property.new.as_ref(), use_color);
                    for line in body.lines() {
                        out.push_str("      ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
        }

        if !self.outputs.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&heading("Outputs", use_color));
            for change in &self.outputs {
                let line = format!("[{}] {}", change.kind.symbol(), change.id);
                out.push_str(&colorize(&line, change.kind, use_color));
                out.push('\n');
                let body = value_diff(change.old.as_ref(), change.new.as_ref(), use_color);
                for line in body.lines() {
                    out.push_str("      ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stats().detailed_summary(use_color));
        out.push('\n');
        out
    }
}

fn heading(title: &str, use_color: bool) -> String {
    if use_color {
        format!("{}\n", title.bold())
    } else {
        format!("{}\n", title)
    }
}

fn colorize(line: &str, kind: ChangeKind, use_color: bool) -> String {
    if !use_color {
        return line.to_string();
    }
    match kind {
        ChangeKind::Added => line.green().to_string(),
        ChangeKind::Removed => line.red().to_string(),
        ChangeKind::Modified => line.yellow().to_string(),
    }
}

fn output_value(output: &Output) -> Value {
    serde_json::to_value(output).unwrap_or(Value::Null)
}

fn resource_changes(old: &Resource, new: &Resource) -> Vec<PropertyChange> {
    let mut changes = Vec::new();

    if old.resource_type != new.resource_type {
        changes.push(PropertyChange {
            path: "Type".to_string(),
            old: Some(Value::String(old.resource_type.clone())),
            new: Some(Value::String(new.resource_type.clone())),
        });
    }

    diff_maps("Properties", &old.properties, &new.properties, &mut changes);

    if old.depends_on != new.depends_on {
        changes.push(PropertyChange {
            path: "DependsOn".to_string(),
            old: Some(serde_json::json!(old.depends_on)),
            new: Some(serde_json::json!(new.depends_on)),
        });
    }
    for (path, old_policy, new_policy) in [
        ("DeletionPolicy", old.deletion_policy, new.deletion_policy),
        (
            "UpdateReplacePolicy",
            old.update_replace_policy,
            new.update_replace_policy,
        ),
    ] {
        if old_policy != new_policy {
            changes.push(PropertyChange {
                path: path.to_string(),
                old: old_policy.and_then(|p| serde_json::to_value(p).ok()),
                new: new_policy.and_then(|p| serde_json::to_value(p).ok()),
            });
        }
    }
    diff_maps("Metadata", &old.metadata, &new.metadata, &mut changes);

    changes
}

fn diff_maps(
    prefix: &str,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    changes: &mut Vec<PropertyChange>,
) {
    for (key, new_value) in new {
        let path = format!("{}.{}", prefix, key);
        match old.get(key) {
            None => changes.push(PropertyChange {
                path,
                old: None,
                new: Some(new_value.clone()),
            }),
            Some(old_value) if old_value == new_value => {}
            Some(Value::Object(old_map)) => match new_value {
                Value::Object(new_map) => diff_maps(&path, old_map, new_map, changes),
                _ => changes.push(PropertyChange {
                    path,
                    old: Some(Value::Object(old_map.clone())),
                    new: Some(new_value.clone()),
                }),
            },
            Some(old_value) => changes.push(PropertyChange {
                path,
                old: Some(old_value.clone()),
                new: Some(new_value.clone()),
            }),
        }
    }
    for (key, old_value) in old {
        if !new.contains_key(key) {
            changes.push(PropertyChange {
                path: format!("{}.{}", prefix, key),
                old: Some(old_value.clone()),
                new: None,
            });
        }
    }
}
