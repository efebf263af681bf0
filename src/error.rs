//! Error types for pgstack.
//!
//! Every failure pgstack can produce happens while the resource graph is being
//! declared or synthesized. Nothing here talks to a cloud API, so there are no
//! transient errors and no retries.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pgstack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for pgstack.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Construct Errors
    // ========================================================================
    /// A construct was given properties that cannot be synthesized.
    #[error("Invalid configuration for '{construct}': {message}")]
    Validation {
        /// Construct path
        construct: String,
        /// Error message
        message: String,
    },

    /// A CIDR block could not be parsed or allocated.
    #[error("Invalid CIDR block '{cidr}': {message}")]
    InvalidCidr {
        /// The offending CIDR
        cidr: String,
        /// Error message
        message: String,
    },

    /// An instance type string was not of the form `<class>.<size>`.
    #[error("Invalid instance type '{0}'")]
    InvalidInstanceType(String),

    // ========================================================================
    // Stack Errors
    // ========================================================================
    /// Two constructs were registered under the same path.
    #[error("Duplicate construct path '{0}'")]
    DuplicateConstruct(String),

    /// Two resources resolved to the same logical id.
    #[error("Duplicate logical id '{0}'")]
    DuplicateLogicalId(String),

    /// Two outputs share an id.
    #[error("Duplicate output '{0}'")]
    DuplicateOutput(String),

    /// Two outputs share an export name.
    #[error("Export name '{export}' is used by both '{first}' and '{second}'")]
    DuplicateExport {
        /// Export name
        export: String,
        /// First output using it
        first: String,
        /// Second output using it
        second: String,
    },

    /// A `Ref`, `Fn::GetAtt` or `DependsOn` points at nothing.
    #[error("'{from}' references unknown logical id '{target}'")]
    UnresolvedReference {
        /// Logical id (or output id) holding the reference
        from: String,
        /// Referenced logical id
        target: String,
    },

    /// The resource graph is not acyclic.
    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    // ========================================================================
    // I/O and Serialization Errors
    // ========================================================================
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Reading or writing a template failed.
    #[error("Failed to access '{path}': {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration value is out of range or malformed.
    #[error("Invalid configuration value for '{key}': {message}")]
    Config {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Validation`] error.
    pub fn validation(construct: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            construct: construct.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Config`] error.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from user-supplied configuration rather than
    /// from an inconsistency inside the construct tree.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. }
                | Error::InvalidCidr { .. }
                | Error::InvalidInstanceType(_)
                | Error::Config { .. }
        )
    }
}
