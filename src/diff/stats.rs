//! Diff statistics.
//!
//! Summary counts for a template diff: how many resources and outputs were
//! added, removed or modified, and how many individual properties changed.

use colored::Colorize;
use serde::Serialize;
use std::fmt;

/// Statistics about a template diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    /// Resources only in the new template
    pub resources_added: usize,
    /// Resources only in the old template
    pub resources_removed: usize,
    /// Resources present in both with different descriptors
    pub resources_modified: usize,
    /// Individual property changes across modified resources
    pub property_changes: usize,
    /// Outputs added, removed or changed
    pub outputs_changed: usize,
}

impl DiffStats {
    /// Create a new empty stats instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    /// Resources and outputs touched
    pub fn total_changes(&self) -> usize {
        self.resources_added + self.resources_removed + self.resources_modified + self.outputs_changed
    }

    /// Format as a detailed summary
    pub fn detailed_summary(&self, use_color: bool) -> String {
        if !self.has_changes() {
            return if use_color {
                "No changes".bright_black().to_string()
            } else {
                "No changes".to_string()
            };
        }

        let plural = |n: usize| if n == 1 { "" } else { "s" };
        if use_color {
            format!(
                "{} resource{} to add, {} to remove, {} to modify ({} propert{}), {} output{} changed",
                self.resources_added.to_string().green().bold(),
                plural(self.resources_added),
                self.resources_removed.to_string().red().bold(),
                self.resources_modified.to_string().yellow().bold(),
                self.property_changes,
                if self.property_changes == 1 { "y" } else { "ies" },
                self.outputs_changed.to_string().bright_white().bold(),
                plural(self.outputs_changed),
            )
        } else {
            format!(
                "{} resource{} to add, {} to remove, {} to modify ({} propert{}), {} output{} changed",
                self.resources_added,
                plural(self.resources_added),
                self.resources_removed,
                self.resources_modified,
                self.property_changes,
                if self.property_changes == 1 { "y" } else { "ies" },
                self.outputs_changed,
                plural(self.outputs_changed),
            )
        }
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detailed_summary(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = DiffStats::default();
        assert!(!stats.has_changes());
        assert_eq!(stats.to_string(), "No changes");
    }

    #[test]
    fn test_total_changes() {
        let stats = DiffStats {
            resources_added: 1,
            resources_removed: 2,
            resources_modified: 1,
            property_changes: 2,
            outputs_changed: 1,
        };
        assert!(stats.has_changes());
        assert_eq!(stats.total_changes(), 5);
    }

    #[test]
    fn test_detailed_summary_pluralization() {
        let stats = DiffStats {
            resources_modified: 1,
            property_changes: 1,
            ..Default::default()
        };
        assert_eq!(
            stats.detailed_summary(false),
            "0 resources to add, 0 to remove, 1 to modify (1 property), 0 outputs changed"
        );
    }
}
