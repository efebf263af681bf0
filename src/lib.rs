//! # pgstack - RDS Postgres stack synthesizer
//!
//! pgstack declares a small, fixed piece of AWS infrastructure (a VPC, a
//! managed Postgres instance, its generated credentials and an IAM role
//! allowed to connect) and synthesizes it into a CloudFormation template.
//! Nothing is deployed: the output is a static document for the provisioning
//! engine.
//!
//! ## Core Concepts
//!
//! - **Stack**: Collects resources and outputs under construct paths
//! - **Constructs**: Typed builders that expand into one or more resources
//! - **Template**: The synthesized document (resources, outputs, intrinsics)
//! - **Revisions**: The three historical shapes of the Postgres stack
//! - **Diff**: Structural comparison of two templates
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     CLI (synth / inspect / diff)             │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │        Config (files + PGSTACK_* env) -> RdsPostgresStack     │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//! ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │  ec2: Vpc,      │  │  rds: Database  │  │  iam: Role      │
//! │  endpoints, SGs │  │  Instance       │  │  secretsmanager │
//! └─────────────────┘  └─────────────────┘  └─────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │      Stack::synth -> Template (validated, acyclic)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use pgstack::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::default();
//!     let stack = RdsPostgresStack::build(&config)?;
//!     println!("{}", stack.synth()?.to_json_pretty()?);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::config::{Config, StackRevision};
    pub use crate::constructs::ec2::{
        EndpointService, InstanceType, Peer, Port, SecurityGroup, SubnetType, Vpc, VpcProps,
    };
    pub use crate::constructs::iam::{PolicyStatement, Role, RoleProps};
    pub use crate::constructs::rds::{DatabaseEngine, DatabaseInstance, DatabaseInstanceProps};
    pub use crate::constructs::secretsmanager::{Secret, SecretProps};
    pub use crate::diff::TemplateDiff;
    pub use crate::error::{Error, Result};
    pub use crate::graph::ResourceGraph;
    pub use crate::stack::{Environment, Stack};
    pub use crate::stacks::RdsPostgresStack;
    pub use crate::template::{Output, Resource, Template, TemplateFormat, Token};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

pub use error::{Error, Result};

/// Template document model and intrinsic functions.
pub mod template;

/// Construct paths and the logical ids derived from them.
pub mod naming;

/// The stack: resource registry, environment and synthesis.
pub mod stack;

/// Dependency graph over synthesized resources.
///
/// Built from `Ref`, `Fn::GetAtt` and `DependsOn` edges. Used to reject
/// cycles at synthesis time and to print a deployment order.
pub mod graph;

// ============================================================================
// Constructs and Stacks
// ============================================================================

/// Typed resource builders (EC2, IAM, RDS, Secrets Manager).
pub mod constructs;

/// Concrete stacks assembled from constructs.
pub mod stacks;

// ============================================================================
// Configuration
// ============================================================================

/// Layered configuration: files, environment variables, validation.
pub mod config;

// ============================================================================
// Reporting
// ============================================================================

/// Structural template diff.
pub mod diff;

// ============================================================================
// Version Information
// ============================================================================

/// Returns the current version of pgstack.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
