//! Shared test utilities and fixtures for the pgstack test suite.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::BTreeSet;

use pgstack::config::{Config, StackRevision};
use pgstack::stack::Environment;
use pgstack::stacks::RdsPostgresStack;
use pgstack::template::{collect_references, Template};
use serde_json::Value;

/// Account used by every fixture.
pub const TEST_ACCOUNT: &str = "123456789012";
/// Region used by every fixture.
pub const TEST_REGION: &str = "eu-west-1";

/// A fixed environment so fixtures do not depend on `CDK_DEFAULT_*`.
pub fn test_env() -> Environment {
    Environment::new(TEST_ACCOUNT, TEST_REGION)
}

/// Default configuration pinned to a revision.
pub fn config_for(revision: StackRevision) -> Config {
    let mut config = Config::default();
    config.stack.revision = revision;
    config
}

/// Build the stack for `config` in the test environment.
pub fn build(config: &Config) -> RdsPostgresStack {
    RdsPostgresStack::build_with_env(config, test_env()).expect("stack should build")
}

/// Build and synthesize the stack for `config` in the test environment.
pub fn synth(config: &Config) -> Template {
    build(config).synth().expect("stack should synthesize")
}

/// Synthesize the default configuration.
pub fn default_template() -> Template {
    synth(&Config::default())
}

/// Logical ids referenced by a value.
pub fn references_in(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_references(value, &mut out);
    out
}

/// The single resource of a type, panicking when there is not exactly one.
pub fn single_of_type<'a>(template: &'a Template, resource_type: &'a str) -> (&'a String, &'a pgstack::template::Resource) {
    let mut found = template.resources_of_type(resource_type);
    let first = found
        .next()
        .unwrap_or_else(|| panic!("no {} in template", resource_type));
    assert!(found.next().is_none(), "more than one {}", resource_type);
    first
}
