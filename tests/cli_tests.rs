//! CLI tests for pgstack
//!
//! This test suite covers:
//! - Subcommand parsing and help output
//! - `synth` to stdout and to files, JSON and YAML
//! - `list`, `outputs` and `graph`
//! - `diff` exit codes and rendering
//! - Config file and revision flags
//! - Error handling for invalid arguments

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

// Helper to get a command isolated from the user's config files
fn pgstack_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pgstack").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("CDK_DEFAULT_ACCOUNT", "123456789012")
        .env("CDK_DEFAULT_REGION", "eu-west-1")
        .env("NO_COLOR", "1")
        .env_remove("PGSTACK_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn synth_json(dir: &TempDir, extra: &[&str]) -> Value {
    let output = pgstack_cmd(dir)
        .arg("synth")
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

// ============================================================================
// Help and Arguments
// ============================================================================

#[test]
fn test_help() {
    let dir = tempdir().unwrap();
    pgstack_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("diff"));
}

#[test]
fn test_unknown_revision_fails() {
    let dir = tempdir().unwrap();
    pgstack_cmd(&dir)
        .args(["synth", "--revision", "v9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("v9"));
}

// ============================================================================
// Synth
// ============================================================================

#[test]
fn test_synth_stdout_json() {
    let dir = tempdir().unwrap();
    let template = synth_json(&dir, &[]);

    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    let resources = template["Resources"].as_object().unwrap();
    let db_count = resources
        .values()
        .filter(|r| r["Type"] == "AWS::RDS::DBInstance")
        .count();
    assert_eq!(db_count, 1);
    assert!(template["Outputs"]["AthenaVpcPublicSubnetsOutput"].is_object());
}

#[test]
fn test_synth_is_stable_across_runs() {
    let dir = tempdir().unwrap();
    let first = pgstack_cmd(&dir).arg("synth").output().unwrap();
    let second = pgstack_cmd(&dir).arg("synth").output().unwrap();
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_synth_revision_flag() {
    let dir = tempdir().unwrap();
    let template = synth_json(&dir, &["--revision", "baseline"]);
    assert!(template["Outputs"]
        .get("AthenaVpcPublicSubnetsOutput")
        .is_none());
}

#[test]
fn test_synth_yaml_to_file() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("template.yaml");
    pgstack_cmd(&dir)
        .args(["synth", "--out"])
        .arg(&out)
        .assert()
        .success();

    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.contains("AWSTemplateFormatVersion"));
    let parsed = pgstack::template::Template::from_path(&out).unwrap();
    assert_eq!(parsed.count_of_type("AWS::EC2::VPC"), 1);
}

#[test]
fn test_synth_format_flag_overrides_extension() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("template.out");
    pgstack_cmd(&dir)
        .args(["synth", "--format", "yaml", "--out"])
        .arg(&out)
        .assert()
        .success();

    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("AWSTemplateFormatVersion:"));
}

#[test]
fn test_synth_uses_project_config() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("pgstack.toml"),
        "[database]\nallocated_storage = 99\n",
    )
    .unwrap();

    let template = synth_json(&dir, &[]);
    let db = template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .find(|r| r["Type"] == "AWS::RDS::DBInstance")
        .unwrap();
    assert_eq!(db["Properties"]["AllocatedStorage"], "99");
}

#[test]
fn test_synth_invalid_config_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[network]\nmax_azs = 0\n").unwrap();

    pgstack_cmd(&dir)
        .arg("-c")
        .arg(&config)
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_azs"));
}

// ============================================================================
// Inspection
// ============================================================================

#[test]
fn test_list_json() {
    let dir = tempdir().unwrap();
    let output = pgstack_cmd(&dir)
        .args(["--output", "json", "list", "--type", "AWS::EC2::Subnet"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let listed: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.iter().all(|r| r["resource_type"] == "AWS::EC2::Subnet"));
}

#[test]
fn test_outputs_table() {
    let dir = tempdir().unwrap();
    pgstack_cmd(&dir)
        .arg("outputs")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbInstanceEndpointAddress-2"))
        .stdout(predicate::str::contains("AthenaDatabaseNameOutput"));
}

#[test]
fn test_graph_dot() {
    let dir = tempdir().unwrap();
    pgstack_cmd(&dir)
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph resources {"))
        .stdout(predicate::str::contains("AWS::RDS::DBInstance"));
}

// ============================================================================
// Diff
// ============================================================================

#[test]
fn test_diff_against_identical_file() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("deployed.json");
    pgstack_cmd(&dir)
        .args(["synth", "--out"])
        .arg(&out)
        .assert()
        .success();

    pgstack_cmd(&dir)
        .args(["diff", "--against"])
        .arg(&out)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("No changes"));
}

#[test]
fn test_diff_instance_type_override() {
    let dir = tempdir().unwrap();
    pgstack_cmd(&dir)
        .args(["diff", "--instance-type", "t3.small"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Properties.DBInstanceClass"))
        .stdout(predicate::str::contains("+db.t3.small"))
        .stdout(predicate::str::contains("1 to modify (1 property)"));
}

#[test]
fn test_diff_json_stats() {
    let dir = tempdir().unwrap();
    let output = pgstack_cmd(&dir)
        .args(["--output", "json", "diff", "--allocated-storage", "30"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["resources_modified"], 1);
    assert_eq!(report["stats"]["property_changes"], 1);
    assert_eq!(
        report["changes"]["resources"][0]["changes"][0]["path"],
        "Properties.AllocatedStorage"
    );
}

#[test]
fn test_diff_requires_a_target() {
    let dir = tempdir().unwrap();
    pgstack_cmd(&dir)
        .arg("diff")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to compare"));
}
